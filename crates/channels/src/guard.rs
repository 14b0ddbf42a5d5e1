//! Echo suppression between the two relay directions.
//!
//! Messages injected from Discord carry an author of the form `<name>`. The
//! outbound path drops any author starting with `<`, so an injected message
//! that the host reports back through its channel-send hook is never posted
//! to the webhook again. Player names cannot start with `<`; enforcing that is
//! up to the host.

use crate::message::truncate_bytes;

const OPEN: char = '<';
const CLOSE: char = '>';

/// Smallest usable name limit: both brackets plus one byte of name.
const MIN_DISPLAY_NAME_BYTES: usize = 3;

/// Tags relayed authors and recognises them on the way back.
#[derive(Debug, Clone, Copy)]
pub struct LoopGuard {
    display_name_bytes: usize,
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(23)
    }
}

impl LoopGuard {
    /// `display_name_bytes` is the host's name limit, brackets included.
    /// Limits below three bytes are raised to three.
    pub fn new(display_name_bytes: usize) -> Self {
        Self {
            display_name_bytes: display_name_bytes.max(MIN_DISPLAY_NAME_BYTES),
        }
    }

    /// Wrap a Discord author name as `<name>`, shortened to fit the host.
    pub fn tag_as_relayed(&self, author: &str) -> String {
        let mut inner = author.trim().to_string();
        truncate_bytes(&mut inner, self.display_name_bytes.saturating_sub(2));
        format!("{OPEN}{inner}{CLOSE}")
    }

    /// Like [`tag_as_relayed`](Self::tag_as_relayed), with a `#1234` suffix
    /// for accounts still carrying a legacy discriminator. `0` means none.
    pub fn tag_with_discriminator(&self, author: &str, discriminator: Option<u16>) -> String {
        match discriminator.filter(|d| *d != 0) {
            Some(d) => {
                let suffix = format!("#{d:04}");
                let budget = self
                    .display_name_bytes
                    .saturating_sub(2)
                    .saturating_sub(suffix.len());
                let mut name = author.trim().to_string();
                truncate_bytes(&mut name, budget);
                name.push_str(&suffix);
                self.tag_as_relayed(&name)
            },
            None => self.tag_as_relayed(author),
        }
    }

    /// True for authors produced by [`tag_as_relayed`](Self::tag_as_relayed).
    pub fn is_relayed_echo(&self, author: &str) -> bool {
        author.starts_with(OPEN)
    }
}
