// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entity identifiers.
//!
//! Job and task ids are client-supplied and of arbitrary length, so unlike
//! the fixed-width ids elsewhere in this codebase family they are plain
//! `String` newtypes rather than packed into a fixed-size inline buffer.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(JobId, "Unique identifier for a job, supplied by the submitting client.");
string_id!(WorkerId, "Unique identifier for a worker instance, supplied at registration.");

/// Task identifier: `{job_id}_task_{index}`.
///
/// The embedded index is the ordering primitive for result assembly —
/// task ordering never depends on arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn for_index(job_id: &JobId, index: usize) -> Self {
        Self(format!("{}_task_{}", job_id.as_str(), index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the task's index from its id, if it follows the
    /// `{job_id}_task_{index}` convention.
    pub fn index(&self) -> Option<usize> {
        self.0.rsplit_once("_task_")?.1.parse().ok()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_roundtrips_index() {
        let job = JobId::new("abc123");
        let task = TaskId::for_index(&job, 7);
        assert_eq!(task.as_str(), "abc123_task_7");
        assert_eq!(task.index(), Some(7));
    }

    #[test]
    fn task_id_index_none_for_malformed() {
        let task = TaskId::new("not-a-task-id");
        assert_eq!(task.index(), None);
    }

    #[test]
    fn job_id_borrows_as_str_for_map_lookup() {
        use std::collections::HashMap;
        let mut map: HashMap<JobId, u32> = HashMap::new();
        map.insert(JobId::new("j1"), 1);
        assert_eq!(map.get("j1"), Some(&1));
    }
}
