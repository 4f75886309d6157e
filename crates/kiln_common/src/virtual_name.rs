//! Virtual filenames: a recipe path paired with an optional variant tag.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Prefix marking an encoded name that carries a variant tag.
const VIRTUAL_PREFIX: &str = "virtual:";

/// A path and variant pair that has no unambiguous string form.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidName {
    /// Variant tags end at the first `:` of the encoded form.
    #[error("variant tag '{0}' contains ':'")]
    VariantHasColon(String),

    /// A base path that already reads as `virtual:<tag>:<path>`.
    #[error("base path '{0}' would decode as a variant name")]
    AmbiguousBase(String),
}

/// The identity key of one logical recipe: a physical file plus a variant.
///
/// An empty variant denotes the base interpretation of the file. Variants are
/// alternate interpretations of the same physical file (for example a native
/// or cross-compiled flavour) and each gets its own cached snapshot.
///
/// The string form is `real_path` for the base variant and
/// `virtual:<variant>:<real_path>` otherwise. Construction rejects the pairs
/// that string form cannot tell apart, so [`decode`](Self::decode) always
/// inverts [`encode`](Self::encode).
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct VirtualName {
    real_path: String,
    variant: String,
}

impl VirtualName {
    /// Creates a name from a real path and a variant tag (`""` for the base).
    pub fn new(
        real_path: impl Into<String>,
        variant: impl Into<String>,
    ) -> Result<Self, InvalidName> {
        let real_path = real_path.into();
        let variant = variant.into();
        if variant.contains(':') {
            return Err(InvalidName::VariantHasColon(variant));
        }
        if variant.is_empty() && split_virtual(&real_path).is_some() {
            return Err(InvalidName::AmbiguousBase(real_path));
        }
        Ok(Self { real_path, variant })
    }

    /// Creates the base name for a real path.
    pub fn base(real_path: impl Into<String>) -> Result<Self, InvalidName> {
        Self::new(real_path, "")
    }

    /// Returns the physical file path.
    pub fn real_path(&self) -> &str {
        &self.real_path
    }

    /// Returns the variant tag, empty for the base name.
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Returns `true` if this is the base interpretation of its file.
    pub fn is_base(&self) -> bool {
        self.variant.is_empty()
    }

    /// Returns the name of a sibling variant of the same physical file.
    pub fn with_variant(&self, variant: &str) -> Result<Self, InvalidName> {
        Self::new(self.real_path.clone(), variant)
    }

    /// Encodes this name into its string form.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decodes a string form back into a name.
    ///
    /// Anything not matching `virtual:<variant>:<path>` with a non-empty
    /// variant is taken verbatim as a base real path. The path part may
    /// itself contain colons.
    pub fn decode(encoded: &str) -> Self {
        match split_virtual(encoded) {
            Some((variant, real_path)) => Self {
                real_path: real_path.to_string(),
                variant: variant.to_string(),
            },
            None => Self {
                real_path: encoded.to_string(),
                variant: String::new(),
            },
        }
    }
}

/// Splits `virtual:<variant>:<path>` into its non-empty variant and path.
fn split_virtual(encoded: &str) -> Option<(&str, &str)> {
    let rest = encoded.strip_prefix(VIRTUAL_PREFIX)?;
    let (variant, real_path) = rest.split_once(':')?;
    (!variant.is_empty()).then_some((variant, real_path))
}

impl fmt::Display for VirtualName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant.is_empty() {
            f.write_str(&self.real_path)
        } else {
            write!(f, "{VIRTUAL_PREFIX}{}:{}", self.variant, self.real_path)
        }
    }
}

impl FromStr for VirtualName {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::decode(s))
    }
}
