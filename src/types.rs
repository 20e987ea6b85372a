//! Core types for study-results

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares an `i64` newtype ID with serde, sqlx and parsing support
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl PartialEq<i64> for $name {
            fn eq(&self, other: &i64) -> bool {
                self.0 == *other
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

entity_id!(
    /// Identifier of a study
    StudyId
);
entity_id!(
    /// Identifier of a component within a study
    ComponentId
);
entity_id!(
    /// Identifier of a batch within a study
    BatchId
);
entity_id!(
    /// Identifier of a worker
    WorkerId
);
entity_id!(
    /// Identifier of one study run
    StudyResultId
);
entity_id!(
    /// Identifier of one component run within a study run
    ComponentResultId
);
entity_id!(
    /// Identifier of a collaborative group session
    GroupResultId
);

/// Declares a string-backed enum stored as TEXT
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Stored/serialized name
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::BadRequest(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

text_enum!(
    /// Kind of participant identity
    ///
    /// Only `Jatos` matters for removal: a worker tied to a platform user is never removed.
    WorkerType {
        /// Worker tied to a registered platform user
        Jatos => "Jatos",
        /// Personal link, single run
        PersonalSingle => "PersonalSingle",
        /// Personal link, multiple runs
        PersonalMultiple => "PersonalMultiple",
        /// General link, single run per browser
        GeneralSingle => "GeneralSingle",
        /// General link, unlimited runs
        GeneralMultiple => "GeneralMultiple",
        /// Mechanical Turk worker
        MTurk => "MTurk",
        /// Mechanical Turk sandbox worker
        MTurkSandbox => "MTurkSandbox",
    }
);

text_enum!(
    /// Lifecycle state of a study run
    StudyResultState {
        /// Created but not yet started
        Pre => "PRE",
        /// Running
        Started => "STARTED",
        /// Study session data retrieved
        DataRetrieved => "DATA_RETRIEVED",
        /// Completed successfully
        Finished => "FINISHED",
        /// Aborted by the worker
        Aborted => "ABORTED",
        /// Ended with an error
        Failed => "FAIL",
    }
);

text_enum!(
    /// Lifecycle state of a component run
    ComponentResultState {
        /// Running
        Started => "STARTED",
        /// Data retrieved by the component
        DataRetrieved => "DATA_RETRIEVED",
        /// Reloaded by the worker
        Reloaded => "RELOADED",
        /// Completed successfully
        Finished => "FINISHED",
        /// Aborted by the worker
        Aborted => "ABORTED",
        /// Ended with an error
        Failed => "FAIL",
    }
);

text_enum!(
    /// Lifecycle state of a group session
    GroupState {
        /// Accepting members
        Started => "STARTED",
        /// Membership frozen
        Fixed => "FIXED",
        /// Session over; eligible for removal once memberless
        Finished => "FINISHED",
    }
);

/// Requested shape of an archive export
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultsType {
    /// Metadata, data and files in one archive
    #[default]
    Combined,
    /// Only the `data.txt` payloads
    DataOnly,
    /// Only uploaded files
    FilesOnly,
    /// Only `metadata.json`
    MetadataOnly,
}

impl ResultsType {
    /// Whether `data.txt` entries are written
    pub fn includes_data(&self) -> bool {
        matches!(self, ResultsType::Combined | ResultsType::DataOnly)
    }

    /// Whether upload directories are copied
    pub fn includes_files(&self) -> bool {
        matches!(self, ResultsType::Combined | ResultsType::FilesOnly)
    }

    /// Whether `metadata.json` is written
    pub fn includes_metadata(&self) -> bool {
        matches!(self, ResultsType::Combined | ResultsType::MetadataOnly)
    }
}

/// The set of results an export operates on
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultScope {
    /// Every result of a study
    Study(StudyId),
    /// Every component result of a component (study results containing one)
    Component(ComponentId),
    /// Every result of a batch, optionally restricted to one worker type
    Batch {
        /// The batch
        batch_id: BatchId,
        /// Only results of workers of this type
        worker_type: Option<WorkerType>,
    },
    /// Every result that is or was a member of a group
    Group(GroupResultId),
    /// Every result of a worker
    Worker(WorkerId),
    /// Explicit study results
    StudyResults(Vec<StudyResultId>),
    /// Explicit component results
    ComponentResults(Vec<ComponentResultId>),
}

impl ResultScope {
    /// Whether the scope names entities explicitly (missing IDs are `NotFound`)
    pub fn is_explicit(&self) -> bool {
        matches!(
            self,
            ResultScope::StudyResults(_) | ResultScope::ComponentResults(_)
        )
    }

    /// Whether a component result of a study result in this scope belongs to the scope
    ///
    /// Study-level scopes take every component result of their study results;
    /// component-level scopes only the matching ones.
    pub fn covers_component_result(&self, id: ComponentResultId, component_id: ComponentId) -> bool {
        match self {
            ResultScope::Component(c) => *c == component_id,
            ResultScope::ComponentResults(ids) => ids.contains(&id),
            _ => true,
        }
    }
}

/// An acting platform user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique login name
    pub username: String,
    /// Display name
    pub name: String,
}

impl User {
    /// Create a user
    pub fn new(username: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            name: name.into(),
        }
    }
}
