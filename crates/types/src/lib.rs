//! # Prenatal Types
//!
//! Small validated value types shared by every crate in the workspace.
//!
//! - [`NonEmptyText`]: trimmed text guaranteed to hold at least one character
//! - [`PatientId`] / [`VisitId`]: opaque record identifiers, minted sequentially
//!   as `PN-000001` and `C-000001`

use std::fmt;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// Errors that can occur when parsing record identifiers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier cannot be empty")]
    Empty,
    #[error("identifier must not contain whitespace or path separators: {0}")]
    InvalidCharacters(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// Returns `Err(TextError::Empty)` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// RECORD IDENTIFIERS
// ============================================================================

fn validate_id(input: &str) -> Result<String, IdError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty);
    }
    // Identifiers double as directory and file names in the file-backed stores.
    let ok = trimmed
        .chars()
        .all(|c| !c.is_whitespace() && !matches!(c, '/' | '\\' | '.'));
    if !ok {
        return Err(IdError::InvalidCharacters(trimmed.to_owned()));
    }
    Ok(trimmed.to_owned())
}

fn sequence_of(id: &str, prefix: &str) -> Option<u32> {
    let digits = id.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

macro_rules! sequential_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix used when minting sequential identifiers.
            pub const PREFIX: &'static str = $prefix;

            /// Parses an identifier. Any non-blank text without whitespace or path
            /// separators is accepted; sequential numbering is optional.
            pub fn parse(input: &str) -> Result<Self, IdError> {
                validate_id(input).map(Self)
            }

            /// Mints the identifier for a given sequence number (zero-padded to six digits).
            pub fn from_sequence(number: u32) -> Self {
                Self(format!("{}{:06}", $prefix, number))
            }

            /// Returns the sequence number when the identifier follows the minted format.
            pub fn sequence(&self) -> Option<u32> {
                sequence_of(&self.0, $prefix)
            }

            /// Highest sequence number among `existing`, or 0 when none is sequential.
            pub fn highest_sequence<'a>(existing: impl IntoIterator<Item = &'a $name>) -> u32 {
                existing
                    .into_iter()
                    .filter_map(|id| id.sequence())
                    .max()
                    .unwrap_or(0)
            }

            /// Mints the identifier after both the last issued sequence and every
            /// sequence in `existing`, so an id freed by a delete is never minted again.
            pub fn next_after<'a>(
                last_issued: u32,
                existing: impl IntoIterator<Item = &'a $name>,
            ) -> Self {
                let highest = Self::highest_sequence(existing).max(last_issued);
                Self::from_sequence(highest.saturating_add(1))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

sequential_id!(
    /// Identifier of a registered patient (`PN-000001`, ...).
    PatientId,
    "PN-"
);

sequential_id!(
    /// Identifier of a recorded visit (`C-000001`, ...).
    VisitId,
    "C-"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_and_rejects_blank() {
        assert_eq!(NonEmptyText::new("  Maria  ").unwrap().as_str(), "Maria");
        assert!(matches!(NonEmptyText::new("   "), Err(TextError::Empty)));
    }

    #[test]
    fn patient_ids_are_minted_sequentially() {
        let ids = vec![
            PatientId::parse("PN-000004").unwrap(),
            PatientId::parse("PN-000012").unwrap(),
            PatientId::parse("legacy-7").unwrap(),
        ];
        assert_eq!(PatientId::highest_sequence(&ids), 12);
        assert_eq!(PatientId::next_after(0, &ids).as_str(), "PN-000013");
        assert_eq!(PatientId::next_after(0, &[]).as_str(), "PN-000001");
    }

    #[test]
    fn last_issued_sequence_outlives_deleted_ids() {
        let remaining = vec![PatientId::from_sequence(1)];
        assert_eq!(PatientId::next_after(2, &remaining).as_str(), "PN-000003");
        assert_eq!(VisitId::next_after(5, &[]).as_str(), "C-000006");
    }

    #[test]
    fn visit_ids_use_their_own_prefix() {
        let id = VisitId::from_sequence(7);
        assert_eq!(id.as_str(), "C-000007");
        assert_eq!(id.sequence(), Some(7));
        assert_eq!(PatientId::parse("C-000007").unwrap().sequence(), None);
    }

    #[test]
    fn ids_reject_path_like_input() {
        assert_eq!(PatientId::parse("  "), Err(IdError::Empty));
        assert!(matches!(
            PatientId::parse("../etc"),
            Err(IdError::InvalidCharacters(_))
        ));
        assert!(matches!(
            VisitId::parse("C 1"),
            Err(IdError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn ids_round_trip_through_serde_as_plain_strings() {
        let id = PatientId::from_sequence(3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"PN-000003\"");
        let back: PatientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<PatientId>("\"\"").is_err());
    }
}
