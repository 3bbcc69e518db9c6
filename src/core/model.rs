//! Closed vocabularies stored as text columns.
//!
//! Each enum round-trips through its exact variant name (`Published`,
//! `RejectedByConflict`, ...) in SQLite, JSON and on the command line.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok($name::$variant),)+
                    other => Err(format!(
                        "invalid {} '{}'; expected one of: {}",
                        stringify!($name),
                        other,
                        $name::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum! {
    /// Lifecycle status shared by tenders and bids.
    Status { Created, Published, Closed }
}

text_enum! {
    ServiceType { Construction, Delivery, Manufacture }
}

text_enum! {
    AuthorType { User, Organization }
}

text_enum! {
    /// Terminal outcome of a bid. Leaves `Expectation` at most once.
    Coordination { Expectation, Approved, Rejected, RejectedByConflict }
}

text_enum! {
    /// A single decider's verdict on a bid.
    Verdict { Approved, Rejected }
}

text_enum! {
    #[allow(clippy::upper_case_acronyms)]
    OrganizationType { IE, LLC, JSC }
}

impl Coordination {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Coordination::Expectation)
    }
}
