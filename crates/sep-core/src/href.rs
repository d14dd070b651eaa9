//! Href codec for the resource tree.
//!
//! Every resource is addressed by a path of `_`-separated segments that starts
//! with a family root (`edev`, `derp`, `upt`, ...). Index segments are
//! unsigned decimal integers and typed sub-element tokens select child lists:
//!
//! ```text
//! /edev                  all end devices
//! /edev_3                end device 3
//! /edev_3_der            DER list of end device 3
//! /edev_3_der_0          DER 0 of end device 3
//! /edev_3_der_0_ders     status of that DER
//! /derp_1_derc_2         control 2 of program 1
//! ```
//!
//! Building never consults live state. A missing component ([`NO_INDEX`] or
//! no sub-type) ends the path, so `build` always emits the shortest valid
//! path and never a trailing separator. Parsing is strict: unknown tokens and
//! segment counts outside the family grammar are errors.
//!
//! ```
//! # use sep_core::href::{EdevHref, EdevSubType, Href};
//! let href = EdevHref::device(3).with_subtype(EdevSubType::Registration);
//! assert_eq!(href.to_string(), "/edev_3_rg");
//! assert_eq!(Href::parse("/edev_3_rg").unwrap(), Href::EndDevice(href));
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Segment separator
pub const SEP: char = '_';

/// Sentinel for "no index, address the collection root"
pub const NO_INDEX: Option<usize> = None;

/// Errors raised while parsing an href
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HrefError {
    #[error("href is empty")]
    Empty,

    #[error("unknown href root '{0}'")]
    UnknownRoot(String),

    #[error("expected root '{expected}', got '{found}'")]
    WrongRoot {
        expected: &'static str,
        found: String,
    },

    #[error("unknown {family} token '{token}'")]
    UnknownToken {
        family: &'static str,
        token: String,
    },

    #[error("invalid index segment '{0}'")]
    InvalidIndex(String),

    #[error("{family} href cannot have {count} segments")]
    SegmentCount { family: &'static str, count: usize },
}

/// Result type for href parsing
pub type HrefResult<T> = Result<T, HrefError>;

macro_rules! href_tokens {
    (
        $(#[$meta:meta])*
        $name:ident, $family:literal {
            $($variant:ident => $token:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All tokens of this family, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Path token for this sub-type
            pub fn token(self) -> &'static str {
                match self {
                    $($name::$variant => $token),+
                }
            }

            /// Resolve a path token
            pub fn from_token(token: &str) -> HrefResult<Self> {
                match token {
                    $($token => Ok($name::$variant),)+
                    other => Err(HrefError::UnknownToken {
                        family: $family,
                        token: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.token())
            }
        }
    };
}

href_tokens! {
    /// Child lists of an end device
    EdevSubType, "end device" {
        Registration => "rg",
        DeviceStatus => "dstat",
        PowerStatus => "ps",
        FunctionSetAssignments => "fsa",
        LogEventList => "lel",
        DeviceInformation => "di",
        Der => "der",
    }
}

href_tokens! {
    /// Sub-resources of a DER
    DerSubType, "DER" {
        Capability => "dercap",
        Settings => "derg",
        Status => "ders",
        Availability => "dera",
        CurrentProgram => "derp",
    }
}

href_tokens! {
    /// Child lists of a DER program
    DerProgramSubType, "DER program" {
        ActiveControls => "derca",
        DefaultControl => "dderc",
        Controls => "derc",
        Curves => "dc",
    }
}

href_tokens! {
    /// Child lists of a function set assignment
    FsaSubType, "function set assignments" {
        DerPrograms => "derp",
    }
}

href_tokens! {
    /// Child lists of a usage point
    UsagePointSubType, "usage point" {
        MeterReadings => "mr",
    }
}

href_tokens! {
    /// Sub-resources of a meter reading
    ReadingSubType, "meter reading" {
        ReadingType => "rt",
        ReadingSet => "rs",
        Reading => "r",
    }
}

pub const EDEV: &str = "edev";
pub const DERP: &str = "derp";
pub const FSA: &str = "fsa";
pub const UPT: &str = "upt";
pub const MUP: &str = "mup";

/// Build `prefix_index`, the default href of the `index`th store item.
pub fn indexed(prefix: &str, index: usize) -> String {
    format!("{}{}{}", prefix, SEP, index)
}

/// Build `parent_name`, the href of a named child list.
pub fn child_list(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, SEP, name)
}

/// Build `parent_name_position`, the default href of a child.
pub fn child(parent: &str, name: &str, position: usize) -> String {
    format!("{}{}{}{}{}", parent, SEP, name, SEP, position)
}

/// Root path for a family, e.g. `/edev`
pub fn root(family: &str) -> String {
    format!("/{}", family)
}

struct Segments<'a> {
    parts: Vec<&'a str>,
}

impl<'a> Segments<'a> {
    fn split(path: &'a str) -> HrefResult<Self> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        if trimmed.is_empty() {
            return Err(HrefError::Empty);
        }
        Ok(Self {
            parts: trimmed.split(SEP).collect(),
        })
    }

    fn root(&self) -> &'a str {
        self.parts[0]
    }

    fn len(&self) -> usize {
        self.parts.len()
    }

    fn expect_root(&self, expected: &'static str) -> HrefResult<()> {
        if self.root() == expected {
            Ok(())
        } else {
            Err(HrefError::WrongRoot {
                expected,
                found: self.root().to_string(),
            })
        }
    }

    fn check_len(&self, family: &'static str, max: usize) -> HrefResult<()> {
        if self.len() > max {
            return Err(HrefError::SegmentCount {
                family,
                count: self.len(),
            });
        }
        Ok(())
    }

    fn index(&self, pos: usize) -> HrefResult<Option<usize>> {
        self.parts.get(pos).map(|s| parse_index(s)).transpose()
    }

    fn token<T>(
        &self,
        pos: usize,
        from_token: impl Fn(&str) -> HrefResult<T>,
    ) -> HrefResult<Option<T>> {
        self.parts.get(pos).map(|s| from_token(s)).transpose()
    }
}

/// Parse a decimal index segment. Only canonical digits are accepted, so
/// `"01"` and `"+1"` are rejected and every index has exactly one spelling.
fn parse_index(segment: &str) -> HrefResult<usize> {
    let canonical = !segment.is_empty()
        && segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'));
    if !canonical {
        return Err(HrefError::InvalidIndex(segment.to_string()));
    }
    segment
        .parse()
        .map_err(|_| HrefError::InvalidIndex(segment.to_string()))
}

/// Writes `/root` then each present component, stopping at the first gap.
struct PathWriter {
    out: String,
    open: bool,
}

impl PathWriter {
    fn new(root: &str) -> Self {
        Self {
            out: format!("/{}", root),
            open: true,
        }
    }

    fn push(&mut self, part: Option<impl fmt::Display>) -> &mut Self {
        match part {
            Some(p) if self.open => {
                self.out.push(SEP);
                self.out.push_str(&p.to_string());
            }
            _ => self.open = false,
        }
        self
    }

    fn finish(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

// ============================================================================
// End devices
// ============================================================================

/// `/edev[_index[_subtype[_subindex[_dersubtype]]]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EdevHref {
    pub index: Option<usize>,
    pub subtype: Option<EdevSubType>,
    pub subtype_index: Option<usize>,
    pub der_subtype: Option<DerSubType>,
}

impl EdevHref {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn device(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    pub fn with_subtype(mut self, subtype: EdevSubType) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn with_subtype_index(mut self, index: usize) -> Self {
        self.subtype_index = Some(index);
        self
    }

    pub fn with_der_subtype(mut self, der_subtype: DerSubType) -> Self {
        self.der_subtype = Some(der_subtype);
        self
    }

    pub fn parse(path: &str) -> HrefResult<Self> {
        let seg = Segments::split(path)?;
        seg.expect_root(EDEV)?;
        seg.check_len("end device", 5)?;

        let subtype = seg.token(2, EdevSubType::from_token)?;
        let der_subtype = seg.token(4, DerSubType::from_token)?;
        if der_subtype.is_some() && subtype != Some(EdevSubType::Der) {
            return Err(HrefError::SegmentCount {
                family: "end device",
                count: seg.len(),
            });
        }

        Ok(Self {
            index: seg.index(1)?,
            subtype,
            subtype_index: seg.index(3)?,
            der_subtype,
        })
    }
}

impl fmt::Display for EdevHref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = PathWriter::new(EDEV)
            .push(self.index)
            .push(self.subtype)
            .push(self.subtype_index)
            .push(self.der_subtype)
            .finish();
        f.write_str(&path)
    }
}

// ============================================================================
// DER programs
// ============================================================================

/// `/derp[_index[_subtype[_subindex]]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DerProgramHref {
    pub index: Option<usize>,
    pub subtype: Option<DerProgramSubType>,
    pub subtype_index: Option<usize>,
}

impl DerProgramHref {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn program(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    pub fn with_subtype(mut self, subtype: DerProgramSubType) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn with_subtype_index(mut self, index: usize) -> Self {
        self.subtype_index = Some(index);
        self
    }

    pub fn parse(path: &str) -> HrefResult<Self> {
        let seg = Segments::split(path)?;
        seg.expect_root(DERP)?;
        seg.check_len("DER program", 4)?;
        Ok(Self {
            index: seg.index(1)?,
            subtype: seg.token(2, DerProgramSubType::from_token)?,
            subtype_index: seg.index(3)?,
        })
    }
}

impl fmt::Display for DerProgramHref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = PathWriter::new(DERP)
            .push(self.index)
            .push(self.subtype)
            .push(self.subtype_index)
            .finish();
        f.write_str(&path)
    }
}

// ============================================================================
// Function set assignments
// ============================================================================

/// `/fsa[_index[_subtype]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FsaHref {
    pub index: Option<usize>,
    pub subtype: Option<FsaSubType>,
}

impl FsaHref {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn assignment(index: usize) -> Self {
        Self {
            index: Some(index),
            subtype: None,
        }
    }

    pub fn with_subtype(mut self, subtype: FsaSubType) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn parse(path: &str) -> HrefResult<Self> {
        let seg = Segments::split(path)?;
        seg.expect_root(FSA)?;
        seg.check_len("function set assignments", 3)?;
        Ok(Self {
            index: seg.index(1)?,
            subtype: seg.token(2, FsaSubType::from_token)?,
        })
    }
}

impl fmt::Display for FsaHref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = PathWriter::new(FSA)
            .push(self.index)
            .push(self.subtype)
            .finish();
        f.write_str(&path)
    }
}

// ============================================================================
// Usage points
// ============================================================================

/// `/upt[_index[_mr[_reading[_readingsubtype]]]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UsagePointHref {
    pub index: Option<usize>,
    pub subtype: Option<UsagePointSubType>,
    pub subtype_index: Option<usize>,
    pub reading_subtype: Option<ReadingSubType>,
}

impl UsagePointHref {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn usage_point(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    pub fn meter_reading(index: usize, reading: usize) -> Self {
        Self {
            index: Some(index),
            subtype: Some(UsagePointSubType::MeterReadings),
            subtype_index: Some(reading),
            reading_subtype: None,
        }
    }

    pub fn with_subtype(mut self, subtype: UsagePointSubType) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn with_reading_subtype(mut self, subtype: ReadingSubType) -> Self {
        self.reading_subtype = Some(subtype);
        self
    }

    pub fn parse(path: &str) -> HrefResult<Self> {
        let seg = Segments::split(path)?;
        seg.expect_root(UPT)?;
        seg.check_len("usage point", 5)?;
        Ok(Self {
            index: seg.index(1)?,
            subtype: seg.token(2, UsagePointSubType::from_token)?,
            subtype_index: seg.index(3)?,
            reading_subtype: seg.token(4, ReadingSubType::from_token)?,
        })
    }
}

impl fmt::Display for UsagePointHref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = PathWriter::new(UPT)
            .push(self.index)
            .push(self.subtype)
            .push(self.subtype_index)
            .push(self.reading_subtype)
            .finish();
        f.write_str(&path)
    }
}

// ============================================================================
// Mirror usage points
// ============================================================================

/// `/mup[_index]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MirrorUsagePointHref {
    pub index: Option<usize>,
}

impl MirrorUsagePointHref {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn mirror(index: usize) -> Self {
        Self { index: Some(index) }
    }

    /// The usage point a mirror feeds (`/mup_n` -> `/upt_n`)
    pub fn usage_point(&self) -> UsagePointHref {
        UsagePointHref {
            index: self.index,
            ..UsagePointHref::default()
        }
    }

    pub fn parse(path: &str) -> HrefResult<Self> {
        let seg = Segments::split(path)?;
        seg.expect_root(MUP)?;
        seg.check_len("mirror usage point", 2)?;
        Ok(Self {
            index: seg.index(1)?,
        })
    }
}

impl fmt::Display for MirrorUsagePointHref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = PathWriter::new(MUP).push(self.index).finish();
        f.write_str(&path)
    }
}

// ============================================================================
// Flat collections
// ============================================================================

href_tokens! {
    /// Roots without a nested grammar
    CollectionRoot, "collection" {
        Curves => "dc",
        Controls => "derc",
        Ders => "der",
        Log => "log",
        DeviceCapability => "dcap",
        Time => "tm",
        ResponseSets => "rsps",
    }
}

impl CollectionRoot {
    /// Whether paths under this root may carry an index segment
    pub fn indexed(self) -> bool {
        !matches!(
            self,
            CollectionRoot::DeviceCapability | CollectionRoot::Time | CollectionRoot::ResponseSets
        )
    }
}

/// `/root[_index]` for the flat collections (`/dc_0`, `/derc_3`, `/tm`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionHref {
    pub root: CollectionRoot,
    pub index: Option<usize>,
}

impl CollectionHref {
    pub fn root(root: CollectionRoot) -> Self {
        Self { root, index: None }
    }

    pub fn item(root: CollectionRoot, index: usize) -> Self {
        Self {
            root,
            index: Some(index),
        }
    }

    pub fn parse(path: &str) -> HrefResult<Self> {
        let seg = Segments::split(path)?;
        let root = CollectionRoot::from_token(seg.root())?;
        let max = if root.indexed() { 2 } else { 1 };
        seg.check_len("collection", max)?;
        Ok(Self {
            root,
            index: seg.index(1)?,
        })
    }
}

impl fmt::Display for CollectionHref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = if self.root.indexed() { self.index } else { None };
        let path = PathWriter::new(self.root.token()).push(index).finish();
        f.write_str(&path)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Any parsed href, tagged by family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Href {
    EndDevice(EdevHref),
    DerProgram(DerProgramHref),
    FunctionSetAssignments(FsaHref),
    UsagePoint(UsagePointHref),
    MirrorUsagePoint(MirrorUsagePointHref),
    Collection(CollectionHref),
}

impl Href {
    /// Parse any href, dispatching on its root segment
    pub fn parse(path: &str) -> HrefResult<Self> {
        let seg = Segments::split(path)?;
        match seg.root() {
            EDEV => EdevHref::parse(path).map(Href::EndDevice),
            DERP => DerProgramHref::parse(path).map(Href::DerProgram),
            FSA => FsaHref::parse(path).map(Href::FunctionSetAssignments),
            UPT => UsagePointHref::parse(path).map(Href::UsagePoint),
            MUP => MirrorUsagePointHref::parse(path).map(Href::MirrorUsagePoint),
            other => match CollectionRoot::from_token(other) {
                Ok(_) => CollectionHref::parse(path).map(Href::Collection),
                Err(_) => Err(HrefError::UnknownRoot(other.to_string())),
            },
        }
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Href::EndDevice(h) => h.fmt(f),
            Href::DerProgram(h) => h.fmt(f),
            Href::FunctionSetAssignments(h) => h.fmt(f),
            Href::UsagePoint(h) => h.fmt(f),
            Href::MirrorUsagePoint(h) => h.fmt(f),
            Href::Collection(h) => h.fmt(f),
        }
    }
}

macro_rules! impl_from_str {
    ($($ty:ty),+) => {
        $(
            impl FromStr for $ty {
                type Err = HrefError;

                fn from_str(s: &str) -> HrefResult<Self> {
                    <$ty>::parse(s)
                }
            }
        )+
    };
}

impl_from_str!(
    Href,
    EdevHref,
    DerProgramHref,
    FsaHref,
    UsagePointHref,
    MirrorUsagePointHref,
    CollectionHref
);
