use super::*;

/// A user-defined per-element processing function.
///
/// [`declare`](DoFn::declare) describes which methods exist and which
/// parameters each one takes; the runner binds those parameters and passes
/// them in the [`ProcessContext`]. Methods emit results through the context.
pub trait DoFn: Send {
    /// Describe the DoFn's methods. Called once when the signature is built.
    fn declare(&self) -> DoFnDecl;

    fn process(&mut self, _ctx: &mut ProcessContext) -> anyhow::Result<()> {
        anyhow::bail!("process is not implemented")
    }

    fn process_batch(&mut self, _ctx: &mut ProcessContext) -> anyhow::Result<()> {
        anyhow::bail!("process_batch is not implemented")
    }

    fn setup(&mut self, _ctx: &mut ProcessContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn start_bundle(&mut self, _ctx: &mut ProcessContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn finish_bundle(&mut self, _ctx: &mut ProcessContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn teardown(&mut self, _ctx: &mut ProcessContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Callback for a fired user timer.
    fn on_timer(&mut self, timer: &TimerSpec, _ctx: &mut ProcessContext) -> anyhow::Result<()> {
        anyhow::bail!("no callback implemented for timer '{}'", timer.name)
    }
}

/// Structural description of a DoFn.
#[derive(Clone, Debug, Default)]
pub struct DoFnDecl {
    pub process: Option<MethodDecl>,
    pub process_batch: Option<MethodDecl>,
    pub setup: MethodDecl,
    pub start_bundle: MethodDecl,
    pub finish_bundle: MethodDecl,
    pub teardown: MethodDecl,
    pub timer_callbacks: Vec<(TimerSpec, MethodDecl)>,
    /// `process` emits batches instead of elements.
    pub process_yields_batches: bool,
    /// `process_batch` emits elements instead of batches.
    pub process_batch_yields_elements: bool,
    /// Each element may produce unbounded output (unbounded splittable work).
    pub unbounded_per_element: bool,
}

impl DoFnDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(mut self, method: MethodDecl) -> Self {
        self.process = Some(method);
        self
    }

    pub fn process_batch(mut self, method: MethodDecl) -> Self {
        self.process_batch = Some(method);
        self
    }

    pub fn setup(mut self, method: MethodDecl) -> Self {
        self.setup = method;
        self
    }

    pub fn start_bundle(mut self, method: MethodDecl) -> Self {
        self.start_bundle = method;
        self
    }

    pub fn finish_bundle(mut self, method: MethodDecl) -> Self {
        self.finish_bundle = method;
        self
    }

    pub fn teardown(mut self, method: MethodDecl) -> Self {
        self.teardown = method;
        self
    }

    pub fn on_timer(mut self, timer: TimerSpec, method: MethodDecl) -> Self {
        self.timer_callbacks.push((timer, method));
        self
    }

    pub fn yields_batches(mut self) -> Self {
        self.process_yields_batches = true;
        self
    }

    pub fn batch_yields_elements(mut self) -> Self {
        self.process_batch_yields_elements = true;
        self
    }

    pub fn unbounded_per_element(mut self) -> Self {
        self.unbounded_per_element = true;
        self
    }
}
