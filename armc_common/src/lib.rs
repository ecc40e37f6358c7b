//! Shared types used by both the front-end stub and the IR core: the
//! built-in runtime function catalogue (spec §6.1/§6.3) and small
//! identifier newtypes reused across crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of runtime functions recognized at call sites. These are
/// never resolved against a user `Function` — the builder recognizes the
/// name directly (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    GetInt,
    GetCh,
    GetArray,
    PutInt,
    PutCh,
    PutArray,
    PutF,
    StartTime,
    StopTime,
}

impl Builtin {
    pub const ALL: [Builtin; 9] = [
        Builtin::GetInt,
        Builtin::GetCh,
        Builtin::GetArray,
        Builtin::PutInt,
        Builtin::PutCh,
        Builtin::PutArray,
        Builtin::PutF,
        Builtin::StartTime,
        Builtin::StopTime,
    ];

    /// Recognize a call-site name as a built-in, per the fixed name set of §6.1.
    pub fn from_name(name: &str) -> Option<Builtin> {
        Some(match name {
            "getint" => Builtin::GetInt,
            "getch" => Builtin::GetCh,
            "getarray" => Builtin::GetArray,
            "putint" => Builtin::PutInt,
            "putch" => Builtin::PutCh,
            "putarray" => Builtin::PutArray,
            "putf" => Builtin::PutF,
            "starttime" => Builtin::StartTime,
            "stoptime" => Builtin::StopTime,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::GetInt => "getint",
            Builtin::GetCh => "getch",
            Builtin::GetArray => "getarray",
            Builtin::PutInt => "putint",
            Builtin::PutCh => "putch",
            Builtin::PutArray => "putarray",
            Builtin::PutF => "putf",
            Builtin::StartTime => "starttime",
            Builtin::StopTime => "stoptime",
        }
    }

    /// §6.3: integer-returning built-ins produce an rvalue/lvalue result;
    /// the rest are void.
    pub fn returns_int(self) -> bool {
        matches!(self, Builtin::GetInt | Builtin::GetCh | Builtin::GetArray)
    }

    /// §6.3: starttime/stoptime require the literal 1 loaded into an
    /// argument register immediately before the call, a convention
    /// inherited from the runtime rather than a normal argument.
    pub fn needs_line_marker(self) -> bool {
        matches!(self, Builtin::StartTime | Builtin::StopTime)
    }

    /// §6.4: every built-in call is treated as having side effects and as
    /// freely using all parameter storage; never pure, never removable by
    /// DCE purely on an empty use-set (Invoke is always kept unless the
    /// callee is additionally known side-effect free — built-ins never are).
    pub fn always_has_side_effects(self) -> bool {
        true
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_all_builtin_names() {
        for b in Builtin::ALL {
            assert_eq!(Builtin::from_name(b.name()), Some(b));
        }
    }

    #[test]
    fn rejects_unknown_name() {
        assert_eq!(Builtin::from_name("memcpy"), None);
    }

    #[test]
    fn int_returning_set_matches_spec() {
        assert!(Builtin::GetInt.returns_int());
        assert!(Builtin::GetCh.returns_int());
        assert!(Builtin::GetArray.returns_int());
        assert!(!Builtin::PutInt.returns_int());
        assert!(!Builtin::StartTime.returns_int());
    }

    #[test]
    fn timing_builtins_need_line_marker() {
        assert!(Builtin::StartTime.needs_line_marker());
        assert!(Builtin::StopTime.needs_line_marker());
        assert!(!Builtin::PutInt.needs_line_marker());
    }
}
