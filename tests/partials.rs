use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dip::{
    Annotation, CallArgs, Callable, InjectError, Injector, Namespace, Provider, Value, annotate,
    callable, constructor, factory, unavailable, value,
};

fn collecting() -> Callable {
    callable(|args: CallArgs| {
        let mut out: Vec<i64> = Vec::new();
        for i in 0..args.args.len() {
            out.push(*args.arg(i)?);
        }
        Ok(value(out))
    })
}

#[test]
fn test_partial_argument_order() {
    let mut ns = Namespace::new("app");
    ns.register_value("resolved", 1i64).unwrap();

    let f = collecting();
    annotate(&f, Annotation::new().note("resolved")).unwrap();

    let injector = Injector::new(Arc::new(ns));
    let wrapper = injector
        .partial(&f, CallArgs::new().with_arg(2i64))
        .unwrap();
    let out = wrapper.call(CallArgs::new().with_arg(3i64)).unwrap();
    // Resolved positionals, then bound, then call-time.
    assert_eq!(*out.downcast_ref::<Vec<i64>>().unwrap(), vec![1, 2, 3]);
    injector.close().unwrap();
}

#[test]
fn test_partial_keyword_merge_order() {
    let mut ns = Namespace::new("app");
    ns.register_value("k_value", 1i64).unwrap();

    let f = callable(|args: CallArgs| Ok(value(*args.kwarg::<i64>("k").unwrap())));
    annotate(&f, Annotation::new().keyword("k", "k_value")).unwrap();

    let injector = Injector::new(Arc::new(ns));
    // Resolved layer only.
    let plain = injector.partial(&f, CallArgs::new()).unwrap();
    assert_eq!(
        *plain.call(CallArgs::new()).unwrap().downcast_ref::<i64>().unwrap(),
        1
    );
    // Bound overrides resolved; call-time overrides bound.
    let bound = injector
        .partial(&f, CallArgs::new().with_kwarg("k", 2i64))
        .unwrap();
    assert_eq!(
        *bound.call(CallArgs::new()).unwrap().downcast_ref::<i64>().unwrap(),
        2
    );
    assert_eq!(
        *bound
            .call(CallArgs::new().with_kwarg("k", 3i64))
            .unwrap()
            .downcast_ref::<i64>()
            .unwrap(),
        3
    );
    injector.close().unwrap();
}

#[test]
fn test_partial_caches_resolved_arguments() {
    let store = Arc::new(Mutex::new(HashMap::from([("k", 1i64)])));
    let reader = store.clone();

    let mut ns = Namespace::new("app");
    ns.register_factory(
        "data",
        factory(move |_args, q| {
            match q.and_then(|k| reader.lock().unwrap().get(k).copied()) {
                Some(v) => Ok(value(v)),
                None => Err(unavailable()),
            }
        }),
    )
    .unwrap();

    let f = callable(|args: CallArgs| Ok(value(*args.arg::<i64>(0)?)));
    annotate(&f, Annotation::new().note("data:k")).unwrap();

    let injector = Injector::new(Arc::new(ns));
    let wrapper = injector.partial(&f, CallArgs::new()).unwrap();
    assert_eq!(
        *wrapper.call(CallArgs::new()).unwrap().downcast_ref::<i64>().unwrap(),
        1
    );

    // Mutate the backing data. A fresh qualified lookup sees the new value
    // (qualified results are never memoized)...
    store.lock().unwrap().insert("k", 99);
    assert_eq!(injector.get_as::<i64>("data:k").unwrap(), 99);
    // ...but the wrapper keeps its first resolution.
    assert_eq!(
        *wrapper.call(CallArgs::new()).unwrap().downcast_ref::<i64>().unwrap(),
        1
    );
    injector.close().unwrap();
}

#[test]
fn test_lazy_partial_resolves_on_first_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();

    let mut ns = Namespace::new("app");
    ns.register_factory(
        "n",
        factory(move |_args, _q| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(value(5i64))
        }),
    )
    .unwrap();

    let f = callable(|args: CallArgs| Ok(value(*args.arg::<i64>(0)?)));
    annotate(&f, Annotation::new().note("n")).unwrap();

    let injector = Injector::new(Arc::new(ns));
    let wrapper = injector.partial(&f, CallArgs::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    wrapper.call(CallArgs::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    injector.close().unwrap();
}

#[test]
fn test_eager_partial_resolves_at_get_time() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();

    let mut ns = Namespace::new("app");
    ns.register_factory(
        "n",
        factory(move |_args, _q| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(value(5i64))
        }),
    )
    .unwrap();

    let f = callable(|args: CallArgs| Ok(value(*args.arg::<i64>(0)?)));
    annotate(&f, Annotation::new().note("n")).unwrap();

    let injector = Injector::new(Arc::new(ns));
    let wrapper = injector.eager_partial(&f, CallArgs::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Re-invocation reuses the originally bound values.
    wrapper.call(CallArgs::new()).unwrap();
    wrapper.call(CallArgs::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    injector.close().unwrap();
}

#[test]
fn test_eager_partial_overrides_do_not_stick() {
    let mut ns = Namespace::new("app");
    ns.register_value("k_value", 1i64).unwrap();

    let f = callable(|args: CallArgs| Ok(value(*args.kwarg::<i64>("k").unwrap())));
    annotate(&f, Annotation::new().keyword("k", "k_value")).unwrap();

    let injector = Injector::new(Arc::new(ns));
    let wrapper = injector.eager_partial(&f, CallArgs::new()).unwrap();
    assert_eq!(
        *wrapper
            .call(CallArgs::new().with_kwarg("k", 7i64))
            .unwrap()
            .downcast_ref::<i64>()
            .unwrap(),
        7
    );
    // A call-time override affects only that call.
    assert_eq!(
        *wrapper.call(CallArgs::new()).unwrap().downcast_ref::<i64>().unwrap(),
        1
    );
    injector.close().unwrap();
}

#[test]
fn test_partial_keywords_are_implicitly_maybe() {
    let mut ns = Namespace::new("app");
    ns.register_value("x", 6i64).unwrap();

    let f = callable(|args: CallArgs| {
        assert!(args.kwarg::<i64>("missing").is_none());
        Ok(value(*args.arg::<i64>(0)?))
    });
    // 'nowhere' is registered in no namespace; a plain keyword note.
    annotate(
        &f,
        Annotation::new().note("x").keyword("missing", "nowhere"),
    )
    .unwrap();

    let injector = Injector::new(Arc::new(ns));
    // Applied directly, the plain keyword note is fatal...
    assert!(matches!(
        injector.apply(&f, CallArgs::new()),
        Err(InjectError::Unresolvable(_))
    ));
    // ...but through a partial every keyword note is implicitly maybe.
    let wrapper = injector.partial(&f, CallArgs::new()).unwrap();
    assert_eq!(
        *wrapper.call(CallArgs::new()).unwrap().downcast_ref::<i64>().unwrap(),
        6
    );
    injector.close().unwrap();
}

#[test]
fn test_partial_directive_as_note() {
    let mut ns = Namespace::new("app");
    ns.register_value("x", 6i64).unwrap();

    let f = callable(|args: CallArgs| Ok(value(*args.arg::<i64>(0)? * 2)));
    annotate(&f, Annotation::new().note("x")).unwrap();

    let injector = Injector::new(Arc::new(ns));
    // A directive note resolves to the wrapper itself, with no provider
    // lookup involved.
    let resolved = injector.get(dip::partial(f, CallArgs::new())).unwrap();
    let wrapper = resolved.downcast::<dip::PartialFn>().unwrap();
    assert_eq!(
        *wrapper.call(CallArgs::new()).unwrap().downcast_ref::<i64>().unwrap(),
        12
    );
    injector.close().unwrap();
}

#[test]
fn test_maybe_around_directive_is_invalid() {
    let f = callable(|_args| Ok(value(0i64)));
    let injector = Injector::new(Arc::new(Namespace::new("app")));
    assert!(matches!(
        injector.get(dip::maybe(dip::partial(f, CallArgs::new()))),
        Err(InjectError::InvalidNote(_))
    ));
    injector.close().unwrap();
}

struct FlagProvider {
    closed: Arc<AtomicBool>,
}

impl Provider for FlagProvider {
    fn get(&mut self, _qualifier: Option<&str>) -> Result<Value, InjectError> {
        Ok(value(()))
    }

    fn close(&mut self) -> Result<(), InjectError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_with_closes_on_success() {
    let closed = Arc::new(AtomicBool::new(false));
    let flag = closed.clone();

    let mut ns = Namespace::new("app");
    ns.register_provider_type(
        "res",
        constructor(move |_args| Ok(FlagProvider { closed: flag.clone() })),
    )
    .unwrap();

    let out = Injector::with(Arc::new(ns), |injector| {
        injector.get("res")?;
        Ok(7i64)
    })
    .unwrap();
    assert_eq!(out, 7);
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_with_closes_on_failure() {
    let closed = Arc::new(AtomicBool::new(false));
    let flag = closed.clone();

    let mut ns = Namespace::new("app");
    ns.register_provider_type(
        "res",
        constructor(move |_args| Ok(FlagProvider { closed: flag.clone() })),
    )
    .unwrap();

    let result: Result<(), _> = Injector::with(Arc::new(ns), |injector| {
        injector.get("res")?;
        injector.get("missing").map(|_| ())
    });
    assert!(matches!(result, Err(InjectError::Unresolvable(_))));
    assert!(closed.load(Ordering::SeqCst));
}
