/// Outcome of one per-request step: a value to carry on with, or the
/// request was already answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow<T> {
    Continue(T),
    Responded,
}

impl<T> Flow<T> {
    pub fn is_responded(&self) -> bool {
        matches!(self, Flow::Responded)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Flow<U> {
        match self {
            Flow::Continue(value) => Flow::Continue(f(value)),
            Flow::Responded => Flow::Responded,
        }
    }

    /// The carried value, if the request was not answered.
    pub fn into_value(self) -> Option<T> {
        match self {
            Flow::Continue(value) => Some(value),
            Flow::Responded => None,
        }
    }
}
