//! Core types for spark-fiber.
//!
//! These types define the vocabulary shared by the work tree, the reconciler
//! and the commit phase: what kind of work a fiber represents, which effects
//! are pending on it, and at what priority an update was requested.

use std::fmt;
use std::rc::Rc;

// =============================================================================
// Keys
// =============================================================================

/// Stable sibling identity supplied by a description.
///
/// Cheap to clone: keys are copied onto every fiber version and into the
/// reconciler's lookup map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    /// Create a key from any string-like value.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Rc::from(key.as_ref()))
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(Rc::from(value))
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Self::new(value.to_string())
    }
}

// =============================================================================
// Work Tags
// =============================================================================

/// Identifies how a fiber is processed by begin/complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    /// Root of a work tree. Holds the update queue carrying the element.
    Root,
    /// Component carrying the class marker.
    ClassComponent,
    /// Render function whose kind is not known until it is invoked.
    IndeterminateComponent,
    /// Primitive output node (`"div"`, `"span"`, ...).
    HostComponent,
    /// Raw text output node.
    HostText,
    /// Transparent grouping of children.
    Fragment,
    /// Context provider. Transparent for output purposes.
    ContextProvider,
}

impl WorkTag {
    /// Whether fibers with this tag own an output-tree instance.
    #[inline]
    pub const fn is_host(self) -> bool {
        matches!(self, Self::HostComponent | Self::HostText)
    }

    /// Whether fibers with this tag can parent host instances at commit.
    #[inline]
    pub const fn is_host_parent(self) -> bool {
        matches!(self, Self::HostComponent | Self::Root)
    }
}

// =============================================================================
// Effect Flags (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Pending effects on a fiber.
    ///
    /// `flags` holds the fiber's own effects, `subtree_flags` the union over
    /// all descendants. Combine with bitwise OR: `Flags::PLACEMENT | Flags::UPDATE`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u32 {
        const NONE = 0;
        /// Host nodes of this fiber must be inserted into the output tree.
        const PLACEMENT = 1 << 1;
        /// Host instance attributes or text changed.
        const UPDATE = 1 << 2;
        /// Some children are listed in `deletions`.
        const CHILD_DELETION = 1 << 4;
        /// Text content must be cleared before children are inserted.
        const CONTENT_RESET = 1 << 5;
        /// The ref must be attached to the instance.
        const REF = 1 << 9;
    }
}

impl Flags {
    /// Effects handled by the mutation walk of commit.
    pub const MUTATION_MASK: Self = Self::PLACEMENT
        .union(Self::UPDATE)
        .union(Self::CHILD_DELETION)
        .union(Self::CONTENT_RESET)
        .union(Self::REF);

    /// Effects handled once the output tree is final.
    pub const LAYOUT_MASK: Self = Self::REF;
}

// =============================================================================
// Lanes
// =============================================================================

bitflags::bitflags! {
    /// Priority tag of an update.
    ///
    /// Recorded on every update for future prioritised rendering. The
    /// single-pass renderer processes all pending updates regardless of lane.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        const NO_LANE = 0;
        const SYNC = 1 << 0;
        const INPUT_CONTINUOUS = 1 << 2;
        const DEFAULT = 1 << 4;
        const IDLE = 1 << 29;
    }
}

// =============================================================================
// Tests
// =============================================================================
