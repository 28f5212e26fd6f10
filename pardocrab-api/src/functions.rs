use pardocrab_core::binder::ProcessContext;
use pardocrab_core::signature::{DoFn, DoFnDecl, MethodDecl};
use pardocrab_core::types::Value;

/// A DoFn whose `process` is a closure over the call's [`ProcessContext`].
///
/// The declaration is supplied up front, so the closure can ask for any
/// parameter the declaration names.
pub struct FnDoFn<F> {
    decl: DoFnDecl,
    process: F,
}

impl<F> FnDoFn<F>
where
    F: FnMut(&mut ProcessContext) -> anyhow::Result<()> + Send,
{
    pub fn new(process_decl: MethodDecl, process: F) -> Self {
        Self {
            decl: DoFnDecl::new().process(process_decl),
            process,
        }
    }

    /// Replace the whole declaration, e.g. to add timers or lifecycle methods.
    pub fn with_decl(mut self, decl: DoFnDecl) -> Self {
        self.decl = decl;
        self
    }
}

impl<F> DoFn for FnDoFn<F>
where
    F: FnMut(&mut ProcessContext) -> anyhow::Result<()> + Send,
{
    fn declare(&self) -> DoFnDecl {
        self.decl.clone()
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        (self.process)(ctx)
    }
}

fn element_decl() -> MethodDecl {
    MethodDecl::new().arg("element")
}

/// One output per element.
pub fn map<F>(mut f: F) -> impl DoFn
where
    F: FnMut(&Value) -> anyhow::Result<Value> + Send,
{
    FnDoFn::new(element_decl(), move |ctx: &mut ProcessContext| {
        let out = f(ctx.element()?)?;
        ctx.collect(out);
        Ok(())
    })
}

/// Zero or more outputs per element.
pub fn flat_map<F>(mut f: F) -> impl DoFn
where
    F: FnMut(&Value) -> anyhow::Result<Vec<Value>> + Send,
{
    FnDoFn::new(element_decl(), move |ctx: &mut ProcessContext| {
        let outs = f(ctx.element()?)?;
        for out in outs {
            ctx.collect(out);
        }
        Ok(())
    })
}

/// Keeps the elements for which `predicate` holds.
pub fn filter<F>(mut predicate: F) -> impl DoFn
where
    F: FnMut(&Value) -> bool + Send,
{
    FnDoFn::new(element_decl(), move |ctx: &mut ProcessContext| {
        let element = ctx.element()?.clone();
        if predicate(&element) {
            ctx.collect(element);
        }
        Ok(())
    })
}
