use super::*;

fn window() -> Window {
    Window::interval(0, 100)
}

#[test]
fn test_value_state_scoped_by_key_and_window() {
    let ctx = InMemoryStateContext::new();
    let spec = StateSpec::value("count");

    let a = ctx.get_state(&spec, &Value::from("a"), &window()).unwrap();
    let b = ctx.get_state(&spec, &Value::from("b"), &window()).unwrap();
    let a_other_window = ctx
        .get_state(&spec, &Value::from("a"), &Window::interval(100, 200))
        .unwrap();

    assert_eq!(a.read().unwrap(), None);
    a.write(Value::from(1)).unwrap();
    a.write(Value::from(2)).unwrap();
    b.write(Value::from(10)).unwrap();

    assert_eq!(a.read().unwrap(), Some(Value::from(2)));
    assert_eq!(b.read().unwrap(), Some(Value::from(10)));
    assert_eq!(a_other_window.read().unwrap(), None);

    // A fresh handle sees the same cell.
    let again = ctx.get_state(&spec, &Value::from("a"), &window()).unwrap();
    assert_eq!(again.read().unwrap(), Some(Value::from(2)));

    again.clear().unwrap();
    assert_eq!(a.read().unwrap(), None);
}

#[test]
fn test_bag_state_appends() {
    let ctx = InMemoryStateContext::new();
    let bag = ctx
        .get_state(&StateSpec::bag("seen"), &Value::from(1), &Window::Global)
        .unwrap();
    bag.add(Value::from("x")).unwrap();
    bag.add(Value::from("y")).unwrap();
    assert_eq!(bag.read_all().unwrap(), vec![Value::from("x"), Value::from("y")]);
}

#[test]
fn test_state_kind_mismatch_is_an_error() {
    let ctx = InMemoryStateContext::new();
    let bag = ctx
        .get_state(&StateSpec::bag("seen"), &Value::from(1), &Window::Global)
        .unwrap();
    assert!(bag.write(Value::from(1)).is_err());
    assert!(bag.read().is_err());

    let value = ctx
        .get_state(&StateSpec::value("v"), &Value::from(1), &Window::Global)
        .unwrap();
    assert!(value.add(Value::from(1)).is_err());
}

#[test]
fn test_timer_service_reregistration_moves_timer() {
    let mut timers = TimerService::new();
    timers.register(b"t".to_vec(), 100);
    timers.register(b"t".to_vec(), 50);
    assert_eq!(timers.len(), 1);
    assert_eq!(timers.next_timer(), Some(50));

    assert!(timers.drain_due(49).is_empty());
    assert_eq!(timers.drain_due(100), vec![(b"t".to_vec(), 50)]);
    assert!(timers.is_empty());
}

#[test]
fn test_timer_service_delete() {
    let mut timers = TimerService::new();
    timers.register(b"a".to_vec(), 10);
    timers.register(b"b".to_vec(), 10);
    timers.delete(b"a");
    timers.delete(b"missing");
    assert_eq!(timers.drain_due(10), vec![(b"b".to_vec(), 10)]);
}

#[test]
fn test_in_memory_timers_fire_in_order_per_domain() {
    let ctx = InMemoryStateContext::new();
    let key = Value::from("k");
    let event = ctx
        .get_timer(&TimerSpec::event_time("flush"), &key, &window(), 0, &PaneInfo::NO_FIRING)
        .unwrap();
    let processing = ctx
        .get_timer(
            &TimerSpec::processing_time("gc"),
            &key,
            &window(),
            0,
            &PaneInfo::NO_FIRING,
        )
        .unwrap();

    event.set(30, "").unwrap();
    event.set(20, "late").unwrap();
    processing.set(5, "").unwrap();
    assert_eq!(ctx.pending_timers().unwrap(), 3);
    assert_eq!(ctx.next_timer(TimeDomain::EventTime).unwrap(), Some(20));

    let fired = ctx.fire_due(TimeDomain::EventTime, 100).unwrap();
    assert_eq!(fired.len(), 2);
    assert_eq!(fired[0].fire_at, 20);
    assert_eq!(fired[0].dynamic_tag, "late");
    assert_eq!(fired[1].fire_at, 30);
    assert_eq!(fired[1].key, key);
    assert_eq!(fired[1].window, window());
    assert_eq!(fired[1].timer.name, "flush");

    assert_eq!(ctx.pending_timers().unwrap(), 1);
}

#[test]
fn test_in_memory_timer_clear() {
    let ctx = InMemoryStateContext::new();
    let timer = ctx
        .get_timer(
            &TimerSpec::event_time("flush"),
            &Value::from(1),
            &Window::Global,
            0,
            &PaneInfo::NO_FIRING,
        )
        .unwrap();
    timer.set(10, "").unwrap();
    timer.clear("").unwrap();
    assert!(ctx.fire_due(TimeDomain::EventTime, 10).unwrap().is_empty());
}
