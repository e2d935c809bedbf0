//! Pure routing rules.
//!
//! These functions decide classification, target validity, live recipients and
//! replay visibility without touching any shared state, so the routing engine
//! can apply them inside its critical section.

use super::envelope::Kind;

/// Classify a `message` body by its leading prefix.
///
/// `@name rest` becomes a direct message to `name`, `!name rest` an excluded
/// message hiding it from `name`. A prefix with an empty name or an empty rest
/// is left as a plain message. Returns the kind and the body to deliver.
pub fn classify_body(body: &str) -> (Kind, String) {
    let mut chars = body.chars();
    let build: fn(String) -> Kind = match chars.next() {
        Some('@') => |target: String| Kind::Direct { target },
        Some('!') => |excluded: String| Kind::Excluded { excluded },
        _ => return (Kind::Message, body.to_string()),
    };

    match split_name(chars.as_str()) {
        Some((name, rest)) => (build(name.to_string()), rest.to_string()),
        None => (Kind::Message, body.to_string()),
    }
}

/// Split `name rest` at the first whitespace. Both parts must be non-empty.
pub(crate) fn split_name(input: &str) -> Option<(&str, &str)> {
    let (name, rest) = input.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    if name.is_empty() || rest.is_empty() {
        return None;
    }
    Some((name, rest))
}

/// Reject `direct` / `excluded` records aimed at the sender itself.
///
/// Returns a human-readable reason on failure.
pub fn validate_target(sender: &str, kind: &Kind) -> Result<(), String> {
    match kind {
        Kind::Direct { target } if target.is_empty() => {
            Err("a direct message needs a target user".to_string())
        }
        Kind::Direct { target } if target == sender => {
            Err("you cannot send a direct message to yourself".to_string())
        }
        Kind::Excluded { excluded } if excluded.is_empty() => {
            Err("an excluded message needs a user to exclude".to_string())
        }
        Kind::Excluded { excluded } if excluded == sender => {
            Err("you cannot exclude yourself from your own message".to_string())
        }
        _ => Ok(()),
    }
}

/// Whether the registered connection named `candidate` receives a live record
/// of `kind` sent by `sender`.
///
/// `ack` records are addressed through the acknowledged record's sender and
/// never match here.
pub fn is_recipient(kind: &Kind, sender: &str, candidate: &str) -> bool {
    match kind {
        Kind::Join | Kind::Leave | Kind::Message | Kind::System | Kind::Typing { .. } => {
            candidate != sender
        }
        Kind::Direct { target } => candidate == target || candidate == sender,
        Kind::Excluded { excluded } => candidate != excluded,
        Kind::Ack { .. } => false,
    }
}

/// Whether a history record may be replayed to a connection named `viewer`.
pub fn is_visible_to(kind: &Kind, sender: &str, viewer: &str) -> bool {
    match kind {
        Kind::Direct { target } => viewer == target || viewer == sender,
        Kind::Excluded { excluded } => viewer != excluded,
        Kind::Typing { .. } | Kind::Ack { .. } => false,
        Kind::Join | Kind::Leave | Kind::Message | Kind::System => true,
    }
}
