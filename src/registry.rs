//! Task registry: maps registered names to uniform invocation adapters.
//!
//! A task function is an async function (or closure) over the supported
//! primitive types, returning `Result<R, E>`. At registration time it is
//! wrapped into a uniform adapter that checks arity and coerces each wire
//! argument against the captured parameter types up front, handing back the
//! invocation future only when the arguments fit. The split lets a
//! dispatcher distinguish argument failures (the task never began) from
//! execution failures, and record states accordingly.
//!
//! Registration is monotonic: names are added before workers start and only
//! consulted afterwards. Consultation clones the `Arc`'d adapter under a
//! brief read guard, so no lock is held across an invocation.

use crate::core::{coerce, ArgKind, ArgValue, CoreError, TaskArg};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A boxed error that can be sent across threads.
///
/// This is the standard error type used throughout async Rust ecosystems;
/// any error implementing `std::error::Error` converts into it, as does a
/// plain `String`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a dispatch failed.
///
/// Whatever the variant, the worker records a FAILURE state carrying this
/// error's string and publishes the signature's `on_error` continuations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TaskError {
    /// The signature names a task that was never registered.
    #[error("task not registered: {0}")]
    NotRegistered(String),

    /// The signature's arguments do not fit the task's parameter list.
    #[error(transparent)]
    Coercion(#[from] CoreError),

    /// The task function itself returned an error.
    #[error("{0}")]
    Failed(String),
}

/// The future produced by a prepared task invocation.
pub type TaskFuture =
    Pin<Box<dyn Future<Output = Result<ArgValue, TaskError>> + Send>>;

/// A uniform, type-erased task adapter.
///
/// Calling it coerces the wire arguments eagerly: arity and type failures
/// come back as an immediate `Err` and the task function is never invoked.
/// On success the returned future runs the task.
pub type TaskFn =
    Arc<dyn Fn(Vec<TaskArg>) -> Result<TaskFuture, TaskError> + Send + Sync>;

/// Types usable as task parameters and return values.
///
/// Implemented for the primitive numerics, `bool`, and `String` — the same
/// set the wire tag space names. The worker coerces each wire argument to
/// the parameter's `KIND` before invocation.
pub trait ArgType: Into<ArgValue> + Sized + Send + 'static {
    const KIND: ArgKind;

    /// Extracts a concrete value from a wire argument, coercing the JSON
    /// value to `KIND`. The error is a human-readable reason.
    fn from_task_arg(arg: &TaskArg) -> Result<Self, String>;
}

macro_rules! impl_arg_type {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl ArgType for $ty {
                const KIND: ArgKind = ArgKind::$kind;

                fn from_task_arg(arg: &TaskArg) -> Result<Self, String> {
                    match coerce(arg, Self::KIND)? {
                        ArgValue::$kind(v) => Ok(v),
                        other => Err(format!(
                            "coerced to unexpected kind {}",
                            other.kind()
                        )),
                    }
                }
            }
        )*
    };
}

impl_arg_type!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    String => String,
);

/// A variadic tail parameter: the task's final parameter absorbs every
/// surplus positional argument, each coerced to `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Variadic<T>(pub Vec<T>);

impl<T> std::ops::Deref for Variadic<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> IntoIterator for Variadic<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<T> From<Vec<T>> for Variadic<T> {
    fn from(values: Vec<T>) -> Self {
        Variadic(values)
    }
}

/// Marker distinguishing variadic-tail adapters from fixed-arity ones
/// during trait resolution. Never constructed.
pub struct WithTail<T>(pub PhantomData<T>);

/// Conversion of a typed async function into a uniform task adapter.
///
/// The `M` parameter is an inference marker encoding the parameter list; it
/// lets one `register` call accept functions of any supported arity, with
/// or without a [`Variadic`] tail.
pub trait IntoTaskFn<M>: Send + Sync + 'static {
    fn into_task_fn(self) -> TaskFn;
}

macro_rules! impl_into_task_fn {
    ($($ty:ident $var:ident @ $idx:tt),*) => {
        impl<Func, Fut, Ret, Err $(, $ty)*> IntoTaskFn<($($ty,)*)> for Func
        where
            Func: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<Ret, Err>> + Send + 'static,
            Ret: ArgType,
            Err: Into<BoxError> + 'static,
            $($ty: ArgType,)*
        {
            fn into_task_fn(self) -> TaskFn {
                let func = Arc::new(self);
                Arc::new(move |args: Vec<TaskArg>| {
                    let expected = <[usize]>::len(&[$($idx,)*]);
                    if args.len() != expected {
                        return Err(TaskError::Coercion(CoreError::WrongArgCount {
                            expected,
                            got: args.len(),
                        }));
                    }
                    $(
                        let $var = <$ty as ArgType>::from_task_arg(&args[$idx])
                            .map_err(|reason| {
                                TaskError::Coercion(CoreError::WrongArgType {
                                    position: $idx,
                                    reason,
                                })
                            })?;
                    )*
                    let func = func.clone();
                    let invocation: TaskFuture = Box::pin(async move {
                        match func($($var),*).await {
                            Ok(value) => Ok(value.into()),
                            Err(e) => Err(TaskError::Failed(e.into().to_string())),
                        }
                    });
                    Ok(invocation)
                })
            }
        }
    };
}

impl_into_task_fn!();
impl_into_task_fn!(A0 a0 @ 0);
impl_into_task_fn!(A0 a0 @ 0, A1 a1 @ 1);
impl_into_task_fn!(A0 a0 @ 0, A1 a1 @ 1, A2 a2 @ 2);
impl_into_task_fn!(A0 a0 @ 0, A1 a1 @ 1, A2 a2 @ 2, A3 a3 @ 3);
impl_into_task_fn!(A0 a0 @ 0, A1 a1 @ 1, A2 a2 @ 2, A3 a3 @ 3, A4 a4 @ 4);
impl_into_task_fn!(A0 a0 @ 0, A1 a1 @ 1, A2 a2 @ 2, A3 a3 @ 3, A4 a4 @ 4, A5 a5 @ 5);

macro_rules! impl_into_task_fn_variadic {
    ($($ty:ident $var:ident @ $idx:tt),*) => {
        impl<Func, Fut, Ret, Err, Tail $(, $ty)*> IntoTaskFn<WithTail<($($ty,)* Tail)>> for Func
        where
            Func: Fn($($ty,)* Variadic<Tail>) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<Ret, Err>> + Send + 'static,
            Ret: ArgType,
            Err: Into<BoxError> + 'static,
            Tail: ArgType,
            $($ty: ArgType,)*
        {
            fn into_task_fn(self) -> TaskFn {
                let func = Arc::new(self);
                Arc::new(move |args: Vec<TaskArg>| {
                    let fixed = <[usize]>::len(&[$($idx,)*]);
                    if args.len() < fixed {
                        return Err(TaskError::Coercion(CoreError::WrongArgCount {
                            expected: fixed,
                            got: args.len(),
                        }));
                    }
                    $(
                        let $var = <$ty as ArgType>::from_task_arg(&args[$idx])
                            .map_err(|reason| {
                                TaskError::Coercion(CoreError::WrongArgType {
                                    position: $idx,
                                    reason,
                                })
                            })?;
                    )*
                    let mut tail = Vec::with_capacity(args.len() - fixed);
                    for (offset, arg) in args[fixed..].iter().enumerate() {
                        let value = <Tail as ArgType>::from_task_arg(arg)
                            .map_err(|reason| {
                                TaskError::Coercion(CoreError::WrongArgType {
                                    position: fixed + offset,
                                    reason,
                                })
                            })?;
                        tail.push(value);
                    }
                    let func = func.clone();
                    let invocation: TaskFuture = Box::pin(async move {
                        match func($($var,)* Variadic(tail)).await {
                            Ok(value) => Ok(value.into()),
                            Err(e) => Err(TaskError::Failed(e.into().to_string())),
                        }
                    });
                    Ok(invocation)
                })
            }
        }
    };
}

impl_into_task_fn_variadic!();
impl_into_task_fn_variadic!(A0 a0 @ 0);
impl_into_task_fn_variadic!(A0 a0 @ 0, A1 a1 @ 1);
impl_into_task_fn_variadic!(A0 a0 @ 0, A1 a1 @ 1, A2 a2 @ 2);

/// Registry that maps task names to their adapters.
///
/// # Example
///
/// ```no_run
/// use ergates::registry::{BoxError, Registry};
///
/// async fn add(a: i64, b: i64) -> Result<i64, BoxError> {
///     Ok(a + b)
/// }
///
/// let mut registry = Registry::new();
/// registry.register("add", add);
/// ```
pub struct Registry {
    tasks: HashMap<String, TaskFn>,
}

impl Registry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Registers a task function under the given name.
    ///
    /// The function is wrapped into a uniform adapter that coerces wire
    /// arguments against its parameter types before invoking it. A later
    /// registration under the same name replaces the earlier one.
    pub fn register<M>(&mut self, name: impl Into<String>, task: impl IntoTaskFn<M>) {
        let name = name.into();
        debug!("registered task: {}", name);
        self.tasks.insert(name, task.into_task_fn());
    }

    /// Looks up a task adapter by name.
    ///
    /// The `Arc` clone is cheap and lets the caller release any surrounding
    /// lock before invoking.
    pub fn get(&self, name: &str) -> Option<TaskFn> {
        self.tasks.get(name).cloned()
    }

    /// Returns true if a task is registered under the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Returns the number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no tasks are registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn add(a: i64, b: i64) -> Result<i64, BoxError> {
        Ok(a + b)
    }

    async fn fails(_a: i64) -> Result<i64, BoxError> {
        Err("deliberate".into())
    }

    fn int_arg(v: i64) -> TaskArg {
        TaskArg::typed(v)
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let mut registry = Registry::new();
        registry.register("add", add);
        assert!(registry.contains("add"));
        assert_eq!(registry.len(), 1);

        let task = registry.get("add").unwrap();
        let value = task(vec![int_arg(2), int_arg(3)]).unwrap().await.unwrap();
        assert_eq!(value, ArgValue::Int64(5));
    }

    #[tokio::test]
    async fn test_wrong_arg_count() {
        let mut registry = Registry::new();
        registry.register("add", add);

        // Arity failures surface before any invocation future exists.
        let task = registry.get("add").unwrap();
        let err = match task(vec![int_arg(2)]) {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert!(
            matches!(
                err,
                TaskError::Coercion(CoreError::WrongArgCount { expected: 2, got: 1 })
            ),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_wrong_arg_type() {
        let mut registry = Registry::new();
        registry.register("add", add);

        let task = registry.get("add").unwrap();
        let err = match task(vec![TaskArg::new("string", json!("x")), int_arg(1)]) {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert!(err.to_string().contains("wrong argument type at position 0"));
    }

    #[tokio::test]
    async fn test_coercion_failure_never_invokes() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = calls.clone();

        let mut registry = Registry::new();
        registry.register("count", move |v: i64| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok::<i64, BoxError>(v)
            }
        });

        let task = registry.get("count").unwrap();
        assert!(task(vec![TaskArg::new("string", json!("x"))]).is_err());
        assert!(task(vec![]).is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_task_returned_error_is_stringified() {
        let mut registry = Registry::new();
        registry.register("fails", fails);

        let task = registry.get("fails").unwrap();
        let err = task(vec![int_arg(1)]).unwrap().await.unwrap_err();
        assert!(matches!(err, TaskError::Failed(ref msg) if msg == "deliberate"));
    }

    #[tokio::test]
    async fn test_widened_wire_values_coerce() {
        // Arguments as a foreign JSON encoder would produce them: every
        // number a float.
        let mut registry = Registry::new();
        registry.register("add", add);

        let task = registry.get("add").unwrap();
        let value = task(vec![
            TaskArg::new("int64", json!(2.0)),
            TaskArg::new("int64", json!(3.0)),
        ])
        .unwrap()
        .await
        .unwrap();
        assert_eq!(value, ArgValue::Int64(5));
    }

    #[tokio::test]
    async fn test_variadic_tail_absorbs_surplus() {
        async fn sum(base: i64, rest: Variadic<i64>) -> Result<i64, BoxError> {
            Ok(base + rest.into_iter().sum::<i64>())
        }

        let mut registry = Registry::new();
        registry.register("sum", sum);

        let task = registry.get("sum").unwrap();
        let value = task(vec![int_arg(1), int_arg(2), int_arg(3), int_arg(4)])
            .unwrap()
            .await
            .unwrap();
        assert_eq!(value, ArgValue::Int64(10));

        // The tail may be empty.
        let task = registry.get("sum").unwrap();
        let value = task(vec![int_arg(7)]).unwrap().await.unwrap();
        assert_eq!(value, ArgValue::Int64(7));
    }

    #[tokio::test]
    async fn test_variadic_requires_fixed_args() {
        async fn sum(base: i64, rest: Variadic<i64>) -> Result<i64, BoxError> {
            Ok(base + rest.into_iter().sum::<i64>())
        }

        let mut registry = Registry::new();
        registry.register("sum", sum);

        let task = registry.get("sum").unwrap();
        let err = match task(vec![]) {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(
            err,
            TaskError::Coercion(CoreError::WrongArgCount { expected: 1, got: 0 })
        ));
    }

    #[tokio::test]
    async fn test_variadic_tail_type_error_reports_position() {
        async fn sum(base: i64, rest: Variadic<i64>) -> Result<i64, BoxError> {
            Ok(base + rest.into_iter().sum::<i64>())
        }

        let mut registry = Registry::new();
        registry.register("sum", sum);

        let task = registry.get("sum").unwrap();
        let err = match task(vec![int_arg(1), int_arg(2), TaskArg::new("string", json!("x"))]) {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(
            err,
            TaskError::Coercion(CoreError::WrongArgType { position: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_return_value_carries_runtime_tag() {
        async fn flag(v: bool) -> Result<bool, BoxError> {
            Ok(!v)
        }
        async fn half(v: u32) -> Result<u32, BoxError> {
            Ok(v / 2)
        }

        let mut registry = Registry::new();
        registry.register("flag", flag);
        registry.register("half", half);

        let value = registry.get("flag").unwrap()(vec![TaskArg::typed(false)])
            .unwrap()
            .await
            .unwrap();
        assert_eq!(value.kind(), ArgKind::Bool);

        let value = registry.get("half").unwrap()(vec![TaskArg::typed(8u32)])
            .unwrap()
            .await
            .unwrap();
        assert_eq!(value, ArgValue::Uint32(4));
    }

    #[tokio::test]
    async fn test_closures_capture_state() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = calls.clone();

        let mut registry = Registry::new();
        registry.register("count", move |v: i64| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok::<i64, BoxError>(v)
            }
        });

        let task = registry.get("count").unwrap();
        task(vec![int_arg(1)]).unwrap().await.unwrap();
        task(vec![int_arg(2)]).unwrap().await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
