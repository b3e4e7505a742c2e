//! Turn-based history truncation.

use crate::session::{Message, Role};

/// Keep only the last `max_turns` user turns of `messages`.
///
/// A turn starts at a user message and runs until the next one. The result
/// is a suffix of the input beginning at the `max_turns`-th user message
/// counted from the end, so anything before it (including leading assistant
/// or tool messages) goes with the discarded turns. `max_turns == 0` means
/// unlimited.
///
/// # Examples
/// ```
/// use convoclaw::agent::turns::limit_history_turns;
/// use convoclaw::session::Message;
///
/// let history = vec![
///     Message::user("one"),
///     Message::assistant("1"),
///     Message::user("two"),
///     Message::assistant("2"),
/// ];
/// let limited = limit_history_turns(&history, 1);
/// assert_eq!(limited.len(), 2);
/// assert_eq!(limited[0].content, "two");
/// ```
pub fn limit_history_turns(messages: &[Message], max_turns: usize) -> &[Message] {
    if max_turns == 0 {
        return messages;
    }

    let mut seen = 0;
    for (idx, msg) in messages.iter().enumerate().rev() {
        if msg.role == Role::User {
            seen += 1;
            if seen == max_turns {
                return &messages[idx..];
            }
        }
    }

    messages
}
