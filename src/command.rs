/// Commands driving the node's internal lifecycle, posted onto a single
/// channel shared by RPC handlers, the sync loop and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    /// Interrupts any in-progress mining job; the supervisor starts a new
    /// job at the (possibly new) tail.
    Restart,
    AddPeer(String),
    ListPeer,
    Show,
    Sync,
    Key,
    Introduce(String),
}

pub type CommandSender = tokio::sync::mpsc::UnboundedSender<Command>;
pub type CommandReceiver = tokio::sync::mpsc::UnboundedReceiver<Command>;

#[must_use]
pub fn channel() -> (CommandSender, CommandReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
