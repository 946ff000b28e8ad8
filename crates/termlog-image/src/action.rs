/// What a controlled handler wants done after seeing a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlledAction {
    /// Stop now and leave this fragment unconsumed; it is delivered again on
    /// the next poll.
    Abort,
    /// Consume this fragment, publish the position through it and stop.
    Break,
    /// Consume this fragment, publish the position through it and keep going.
    Commit,
    /// Consume this fragment and keep going; the position is published at the
    /// next commit or at the end of the poll.
    Continue,
}
