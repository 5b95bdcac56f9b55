use crate::error::{Error, Result};
use crate::model::Id;
use serde_json::Value;

/// The requester of a view, possibly anonymous.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewer(Option<Id>);

impl Viewer {
    pub fn anonymous() -> Viewer {
        Viewer(None)
    }

    pub fn user(id: Id) -> Viewer {
        Viewer(Some(id))
    }

    pub fn id(&self) -> Option<Id> {
        self.0
    }

    pub fn require(&self) -> Result<Id> {
        self.0
            .ok_or_else(|| Error::Unauthenticated("Unauthorized request".to_owned()))
    }
}

/// Whether the viewer appears as `key` in any record of a joined relation.
/// Anonymous viewers are never members.
pub fn is_member(viewer: Viewer, relation: Option<&Value>, key: &str) -> bool {
    let id = match viewer.id() {
        Some(id) => id,
        None => return false,
    };
    relation
        .and_then(Value::as_array)
        .map_or(false, |records| {
            records
                .iter()
                .any(|record| record.get(key).and_then(Value::as_u64) == Some(id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn member_when_present() {
        let likes = json!([{ "likedBy": 4 }, { "likedBy": 9 }]);
        assert!(is_member(Viewer::user(9), Some(&likes), "likedBy"));
        assert!(!is_member(Viewer::user(5), Some(&likes), "likedBy"));
    }

    #[test]
    fn anonymous_is_never_member() {
        let likes = json!([{ "likedBy": 4 }]);
        assert!(!is_member(Viewer::anonymous(), Some(&likes), "likedBy"));
        assert!(!is_member(Viewer::anonymous(), None, "likedBy"));
    }

    #[test]
    fn missing_relation_is_false() {
        assert!(!is_member(Viewer::user(1), None, "subscriber"));
        assert!(!is_member(Viewer::user(1), Some(&Value::Null), "subscriber"));
    }

    #[test]
    fn require_rejects_anonymous() {
        assert!(matches!(
            Viewer::anonymous().require(),
            Err(Error::Unauthenticated(_))
        ));
        assert_eq!(Viewer::user(3).require().unwrap(), 3);
    }
}
