/// Result of a pipeline stage that reports its own failures to the user.
///
/// `Failed` carries the message the stage already showed; callers log it and
/// stop, they never alert again. `Aborted` means the user backed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Ok(T),
    Failed(String),
    Aborted,
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(value) => Some(value),
            Outcome::Failed(_) | Outcome::Aborted => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::Failed(message) => Outcome::Failed(message),
            Outcome::Aborted => Outcome::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_preserves_non_ok_variants() {
        assert_eq!(Outcome::Ok(2).map(|v| v * 2), Outcome::Ok(4));
        assert_eq!(
            Outcome::<i32>::Failed("bad".into()).map(|v| v * 2),
            Outcome::Failed("bad".into())
        );
        assert_eq!(Outcome::<i32>::Aborted.map(|v| v * 2), Outcome::Aborted);
    }

    #[test]
    fn ok_discards_failures() {
        assert_eq!(Outcome::Ok("x").ok(), Some("x"));
        assert_eq!(Outcome::<&str>::Aborted.ok(), None);
        assert!(!Outcome::<()>::Failed(String::new()).is_ok());
    }
}
