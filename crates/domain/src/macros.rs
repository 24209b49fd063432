//! Macro for implementing string conversions on domain enums
//!
//! Domain enums travel as lowercase strings in three places: the remote
//! backend columns, the local SQLite columns and log fields. This macro keeps
//! a single table of variant/string pairs per enum.
//!
//! # Example
//!
//! ```rust
//! use policydesk_domain::impl_domain_enum_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Stage {
//!     Draft,
//!     Active,
//! }
//!
//! impl_domain_enum_conversions!(Stage {
//!     Draft => "draft",
//!     Active => "active",
//! });
//!
//! assert_eq!(Stage::Active.as_str(), "active");
//! assert_eq!("DRAFT".parse::<Stage>().unwrap(), Stage::Draft);
//! ```

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum.
///
/// Parsing is case-insensitive; output is always the canonical string.
#[macro_export]
macro_rules! impl_domain_enum_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical string form.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Sample {
        First,
        SecondValue,
    }

    impl_domain_enum_conversions!(Sample {
        First => "first",
        SecondValue => "second-value",
    });

    #[test]
    fn display_uses_canonical_string() {
        assert_eq!(Sample::SecondValue.to_string(), "second-value");
        assert_eq!(Sample::First.as_str(), "first");
    }

    #[test]
    fn parsing_ignores_case() {
        assert_eq!(Sample::from_str("FIRST").unwrap(), Sample::First);
        assert_eq!(Sample::from_str("Second-Value").unwrap(), Sample::SecondValue);
    }

    #[test]
    fn unknown_value_names_the_enum() {
        let err = Sample::from_str("third").unwrap_err();
        assert!(err.contains("Sample"));
        assert!(err.contains("third"));
    }
}
