//! Typed callback protocol. Button data on the wire is `verb:token[:arg]`
//! (Telegram caps callback data at 64 bytes); it is decoded into `Command`
//! exactly once at the update boundary and dispatched by exhaustive match.
//! Malformed data decodes to `None` and is answered as a stale action.

/// Every button the bot ever renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Confirm one confirming item of the session's batch.
    ConfirmItem { token: String, item_id: i64 },
    /// Confirm everything left in the session's batch.
    ConfirmAll { token: String },
    /// Cancel the session's batch (deletes unconfirmed items).
    CancelBatch { token: String },
    /// Open the quantity/category editor for one item.
    EditItem { token: String, item_id: i64 },
    QtyUp { token: String },
    QtyDown { token: String },
    /// Re-categorize the item under edit; index into the fixed picklist.
    SetCategory { token: String, index: usize },
    /// Drill into a category; index into the fixed picklist.
    OpenCategory { token: String, index: usize },
    BackToCategories { token: String },
    /// Tap-cycle one item's status.
    TapItem { token: String, item_id: i64 },
    MarkNotFound { token: String, item_id: i64 },
    ClearFound { token: String },
    ClearSelection { token: String },
    CloseList { token: String },
}

impl Command {
    /// The session token the command is scoped to.
    pub fn token(&self) -> &str {
        match self {
            Command::ConfirmItem { token, .. }
            | Command::ConfirmAll { token }
            | Command::CancelBatch { token }
            | Command::EditItem { token, .. }
            | Command::QtyUp { token }
            | Command::QtyDown { token }
            | Command::SetCategory { token, .. }
            | Command::OpenCategory { token, .. }
            | Command::BackToCategories { token }
            | Command::TapItem { token, .. }
            | Command::MarkNotFound { token, .. }
            | Command::ClearFound { token }
            | Command::ClearSelection { token }
            | Command::CloseList { token } => token,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Command::ConfirmItem { token, item_id } => format!("cfi:{token}:{item_id}"),
            Command::ConfirmAll { token } => format!("cfa:{token}"),
            Command::CancelBatch { token } => format!("cxl:{token}"),
            Command::EditItem { token, item_id } => format!("edt:{token}:{item_id}"),
            Command::QtyUp { token } => format!("qup:{token}"),
            Command::QtyDown { token } => format!("qdn:{token}"),
            Command::SetCategory { token, index } => format!("cat:{token}:{index}"),
            Command::OpenCategory { token, index } => format!("opn:{token}:{index}"),
            Command::BackToCategories { token } => format!("bck:{token}"),
            Command::TapItem { token, item_id } => format!("tap:{token}:{item_id}"),
            Command::MarkNotFound { token, item_id } => format!("nfd:{token}:{item_id}"),
            Command::ClearFound { token } => format!("clf:{token}"),
            Command::ClearSelection { token } => format!("cls:{token}"),
            Command::CloseList { token } => format!("end:{token}"),
        }
    }

    pub fn decode(data: &str) -> Option<Command> {
        let mut parts = data.splitn(3, ':');
        let verb = parts.next()?;
        let token = parts.next()?.to_string();
        if token.is_empty() {
            return None;
        }
        let arg = parts.next();

        let item_id = || arg.and_then(|a| a.parse::<i64>().ok());
        let index = || arg.and_then(|a| a.parse::<usize>().ok());

        match verb {
            "cfi" => Some(Command::ConfirmItem {
                token,
                item_id: item_id()?,
            }),
            "cfa" => Some(Command::ConfirmAll { token }),
            "cxl" => Some(Command::CancelBatch { token }),
            "edt" => Some(Command::EditItem {
                token,
                item_id: item_id()?,
            }),
            "qup" => Some(Command::QtyUp { token }),
            "qdn" => Some(Command::QtyDown { token }),
            "cat" => Some(Command::SetCategory {
                token,
                index: index()?,
            }),
            "opn" => Some(Command::OpenCategory {
                token,
                index: index()?,
            }),
            "bck" => Some(Command::BackToCategories { token }),
            "tap" => Some(Command::TapItem {
                token,
                item_id: item_id()?,
            }),
            "nfd" => Some(Command::MarkNotFound {
                token,
                item_id: item_id()?,
            }),
            "clf" => Some(Command::ClearFound { token }),
            "cls" => Some(Command::ClearSelection { token }),
            "end" => Some(Command::CloseList { token }),
            _ => None,
        }
    }
}
