//! Concrete wrapper facades over the host map model.

mod cow;
mod entity;
mod list;
mod map;
mod node;
mod room;

pub use cow::CowWrapper;
pub use entity::EntityWrapper;
pub use list::ListWrapper;
pub use map::MapWrapper;
pub use node::NodeWrapper;
pub use room::RoomWrapper;

use super::value::Key;
use super::wrapper::Field;

/// Step through an ordered key list, resuming after `after`.
///
/// The position of `after` is found by a linear scan each call, so a key
/// removed between steps ends the walk instead of failing.
fn next_in<F>(keys: &[Key], after: Option<&Key>, read: F) -> Option<(Key, Field)>
where
    F: Fn(&Key) -> Field,
{
    let start = match after {
        None => 0,
        Some(prev) => keys.iter().position(|k| k == prev)? + 1,
    };
    let key = keys.get(start)?.clone();
    let field = read(&key);
    Some((key, field))
}
