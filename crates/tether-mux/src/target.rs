use std::fmt;
use std::str::FromStr;

/// Address of one pane: `session:window.pane`. An empty string requests
/// auto-discovery instead of naming a pane.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct PaneTarget {
    pub session: String,
    pub window: u32,
    pub pane: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid pane target `{0}`, expected session:window.pane")]
pub struct TargetParseError(pub String);

impl PaneTarget {
    pub fn new(session: impl Into<String>, window: u32, pane: u32) -> Self {
        Self {
            session: session.into(),
            window,
            pane,
        }
    }
}

impl FromStr for PaneTarget {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TargetParseError(s.to_string());
        let (session, rest) = s.split_once(':').ok_or_else(err)?;
        let (window, pane) = rest.split_once('.').ok_or_else(err)?;
        if session.is_empty() {
            return Err(err());
        }
        Ok(Self {
            session: session.to_string(),
            window: window.parse().map_err(|_| err())?,
            pane: pane.parse().map_err(|_| err())?,
        })
    }
}

impl fmt::Display for PaneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.session, self.window, self.pane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let target: PaneTarget = "main:0.1".parse().unwrap();
        assert_eq!(target.session, "main");
        assert_eq!(target.window, 0);
        assert_eq!(target.pane, 1);
        assert_eq!(target.to_string(), "main:0.1");
    }

    #[test]
    fn rejects_malformed_targets() {
        assert!("".parse::<PaneTarget>().is_err());
        assert!("main".parse::<PaneTarget>().is_err());
        assert!("main:0".parse::<PaneTarget>().is_err());
        assert!(":0.1".parse::<PaneTarget>().is_err());
        assert!("main:x.1".parse::<PaneTarget>().is_err());
        assert!("main:0.y".parse::<PaneTarget>().is_err());
    }

    #[test]
    fn session_names_may_contain_dots() {
        let target: PaneTarget = "my:1.2".parse().unwrap();
        assert_eq!(target.to_string(), "my:1.2");
    }
}
