use std::fmt;

use ulid::Ulid;

macro_rules! prefixed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, Ulid::new()))
            }

            /// Accept an id previously produced by [`Self::new`].
            pub fn parse(raw: &str) -> Option<Self> {
                let ulid = raw.strip_prefix(Self::PREFIX)?;
                Ulid::from_string(ulid).ok()?;
                Some(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

prefixed_id!(
    /// One delivered (or pending) question instance.
    ViewId,
    "view_"
);
prefixed_id!(
    /// A chain of views owned by one participant (or one direct survey).
    ChainId,
    "chain_"
);
prefixed_id!(
    /// Broadcast entry point of a survey.
    AnnouncementId,
    "ann_"
);
prefixed_id!(
    /// Tutor-session feedback form.
    FormId,
    "form_"
);
