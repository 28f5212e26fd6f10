use super::*;
use anyhow::anyhow;

#[test]
fn test_annotate_appends_step_name() {
    let err = RunnerError::User(anyhow!("boom")).annotate("ParDo(Count)");
    assert_eq!(err.to_string(), "boom [while running 'ParDo(Count)']");
    assert_eq!(err.step_name(), Some("ParDo(Count)"));
}

#[test]
fn test_annotate_is_idempotent() {
    let once = RunnerError::User(anyhow!("boom")).annotate("inner");
    let twice = once.annotate("outer");
    assert_eq!(twice.step_name(), Some("inner"));
    assert_eq!(twice.to_string(), "boom [while running 'inner']");
}

#[test]
fn test_root_and_classification_see_through_annotation() {
    let err = RunnerError::OutputShape("bad".into()).annotate("step");
    assert!(matches!(err.root(), RunnerError::OutputShape(_)));
    assert!(err.is_shape_error());
    assert!(!err.is_validation_error());

    let err = RunnerError::KeyShape("1".into()).annotate("step");
    assert!(err.is_validation_error());
    assert!(!err.is_shape_error());
}

#[test]
fn test_user_error_keeps_context_chain() {
    let err: RunnerError = anyhow!("disk full").context("writing output").into();
    assert_eq!(err.to_string(), "writing output: disk full");
}

#[test]
fn test_collaborator_error_message() {
    let err = RunnerError::collaborator("restriction_size", anyhow!("no size"));
    assert_eq!(err.to_string(), "restriction_size: no size");
}

#[test]
fn test_nested_runner_errors_pass_through() {
    let inner = RunnerError::KeyShape("1".into()).annotate("downstream");
    let err: RunnerError = anyhow::Error::new(inner).into();
    assert_eq!(err.step_name(), Some("downstream"));

    let inner = RunnerError::UnknownTag("x".into()).annotate("downstream");
    let err = RunnerError::downstream("main output", anyhow::Error::new(inner));
    assert_eq!(err.step_name(), Some("downstream"));

    let err = RunnerError::downstream("main output", anyhow!("closed"));
    assert_eq!(err.to_string(), "main output: closed");
}
