//! G-code hooks: power directives embedded in a print job and the command
//! word used to decide what counts as machine activity.
//!
//! Recognised directives, case-insensitive, comments after `;` ignored:
//!
//! | Line | Effect |
//! |------|--------|
//! | `M80 <address>` / `@PLUGON <address>` / `@WEMOON <address>` | power on |
//! | `M81 <address>` / `@PLUGOFF <address>` / `@WEMOOFF <address>` | power off |

use plugwatch_domain::plug::{DesiredState, PlugAddress};

/// A power directive addressed to one plug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcodeDirective {
    pub address: PlugAddress,
    pub desired: DesiredState,
}

/// Extract a power directive from a G-code line.
///
/// Lines without an address are not directives.
#[must_use]
pub fn parse_directive(line: &str) -> Option<GcodeDirective> {
    let code = strip_comment(line);
    let mut parts = code.splitn(2, char::is_whitespace);
    let word = parts.next()?.to_ascii_uppercase();
    let desired = match word.as_str() {
        "M80" | "@PLUGON" | "@WEMOON" => DesiredState::On,
        "M81" | "@PLUGOFF" | "@WEMOOFF" => DesiredState::Off,
        _ => return None,
    };
    let address = PlugAddress::new(parts.next().unwrap_or_default());
    if address.is_empty() {
        return None;
    }
    Some(GcodeDirective { address, desired })
}

/// The command word of a G-code line (`M105`, `G28`…), upper-cased and
/// without line number or checksum.
#[must_use]
pub fn gcode_word(line: &str) -> Option<String> {
    let mut words = strip_comment(line).split_whitespace();
    let mut word = words.next()?;
    if is_line_number(word) {
        word = words.next()?;
    }
    let word = word.split('*').next().unwrap_or_default();
    (!word.is_empty()).then(|| word.to_ascii_uppercase())
}

fn strip_comment(line: &str) -> &str {
    line.split(';').next().unwrap_or_default().trim()
}

fn is_line_number(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some('N' | 'n'))
        && word.len() > 1
        && chars.all(|c| c.is_ascii_digit())
}
