//! Open flags in their familiar string forms.

use std::fmt;
use std::str::FromStr;

use repofs_types::{FsError, FsResult};

/// What `open` does when the path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistsAction {
    /// Open the existing content as-is.
    Nop,
    /// Discard the existing content.
    Truncate,
    /// Fail with AlreadyExists.
    Fail,
}

/// What `open` does when the path is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingAction {
    Create,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub readable: bool,
    pub writable: bool,
    pub append: bool,
    pub if_exists: ExistsAction,
    pub if_missing: MissingAction,
    flag: &'static str,
}

impl OpenFlags {
    /// Parse `r`, `r+`, `rs`, `rs+`, `w`, `wx`, `w+`, `wx+`, `a`, `ax`, `a+`, `ax+`.
    pub fn parse(flag: &str) -> FsResult<Self> {
        use ExistsAction::*;
        use MissingAction::Create;

        let (flag, readable, writable, append, if_exists, if_missing) = match flag {
            "r" => ("r", true, false, false, Nop, MissingAction::Fail),
            "rs" | "sr" => ("rs", true, false, false, Nop, MissingAction::Fail),
            "r+" => ("r+", true, true, false, Nop, MissingAction::Fail),
            "rs+" | "sr+" => ("rs+", true, true, false, Nop, MissingAction::Fail),
            "w" => ("w", false, true, false, Truncate, Create),
            "wx" | "xw" => ("wx", false, true, false, Fail, Create),
            "w+" => ("w+", true, true, false, Truncate, Create),
            "wx+" | "xw+" => ("wx+", true, true, false, Fail, Create),
            "a" => ("a", false, true, true, Nop, Create),
            "ax" | "xa" => ("ax", false, true, true, Fail, Create),
            "a+" => ("a+", true, true, true, Nop, Create),
            "ax+" | "xa+" => ("ax+", true, true, true, Fail, Create),
            other => return Err(FsError::invalid(format!("invalid open flag: {other:?}"))),
        };
        Ok(Self {
            readable,
            writable,
            append,
            if_exists,
            if_missing,
            flag,
        })
    }

    pub fn read() -> Self {
        Self {
            readable: true,
            writable: false,
            append: false,
            if_exists: ExistsAction::Nop,
            if_missing: MissingAction::Fail,
            flag: "r",
        }
    }

    pub fn write() -> Self {
        Self {
            readable: false,
            writable: true,
            append: false,
            if_exists: ExistsAction::Truncate,
            if_missing: MissingAction::Create,
            flag: "w",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.flag
    }
}

impl FromStr for OpenFlags {
    type Err = FsError;

    fn from_str(s: &str) -> FsResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("r", true, false, ExistsAction::Nop, MissingAction::Fail)]
    #[case("r+", true, true, ExistsAction::Nop, MissingAction::Fail)]
    #[case("w", false, true, ExistsAction::Truncate, MissingAction::Create)]
    #[case("wx", false, true, ExistsAction::Fail, MissingAction::Create)]
    #[case("w+", true, true, ExistsAction::Truncate, MissingAction::Create)]
    #[case("a", false, true, ExistsAction::Nop, MissingAction::Create)]
    #[case("ax+", true, true, ExistsAction::Fail, MissingAction::Create)]
    fn parses(
        #[case] flag: &str,
        #[case] readable: bool,
        #[case] writable: bool,
        #[case] if_exists: ExistsAction,
        #[case] if_missing: MissingAction,
    ) {
        let parsed: OpenFlags = flag.parse().unwrap();
        assert_eq!(parsed.readable, readable);
        assert_eq!(parsed.writable, writable);
        assert_eq!(parsed.if_exists, if_exists);
        assert_eq!(parsed.if_missing, if_missing);
        assert_eq!(parsed.to_string(), flag);
    }

    #[test]
    fn append_and_aliases() {
        assert!(OpenFlags::parse("a+").unwrap().append);
        assert!(!OpenFlags::parse("w+").unwrap().append);
        assert_eq!(OpenFlags::parse("xw").unwrap(), OpenFlags::parse("wx").unwrap());
        assert_eq!(OpenFlags::parse("r").unwrap(), OpenFlags::read());
        assert_eq!(OpenFlags::parse("w").unwrap(), OpenFlags::write());
    }

    #[test]
    fn rejects_unknown() {
        assert!(matches!(OpenFlags::parse("rw"), Err(FsError::Invalid(_))));
        assert!(matches!("".parse::<OpenFlags>(), Err(FsError::Invalid(_))));
    }
}
