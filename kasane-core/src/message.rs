//! Message trait for queued event types.

/// A marker trait for events fed through an event queue.
///
/// Messages must be `Send + Sync + 'static` so they can move into spawned tasks.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct Update { id: u64 }
///
/// impl Message for Update {}
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid Message",
    label = "must be `Send + Sync + 'static`",
    note = "Queued events must be thread-safe and static."
)]
pub trait Message: Send + Sync + 'static {}

macro_rules! impl_message {
    ($($ty:ty),* $(,)?) => {
        $(impl Message for $ty {})*
    };
}

// Common Message implementations
impl_message!(
    (),
    bool,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    isize,
    String,
    &'static str,
    serde_json::Value,
    crate::context::Context,
);

impl<T: Message> Message for Box<T> {}
impl<T: Message> Message for std::sync::Arc<T> {}
impl<T: Message> Message for Vec<T> {}
impl<T: Message> Message for Option<T> {}
impl<T: Message, E: Message> Message for Result<T, E> {}
impl<A: Message, B: Message> Message for (A, B) {}
