//! Cross-core software interrupt lines
//!
//! Each core owns a small, fixed table of software interrupt lines. Raising
//! a line from one core runs the handler bound to that line on the other
//! core. The ring queue's notify hook and the transport's receive path each
//! use exactly one line per direction.

/// Identifies one of the two cores of the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreId {
    /// Full-featured core: owns allocation and boots the other core
    Main,
    /// Resource-constrained core: no dynamic allocation, may be power gated
    Sub,
}

impl CoreId {
    /// The other core of the pair
    pub const fn peer(self) -> Self {
        match self {
            CoreId::Main => CoreId::Sub,
            CoreId::Sub => CoreId::Main,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            CoreId::Main => 0,
            CoreId::Sub => 1,
        }
    }
}

/// Software interrupt line number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SwIntrId {
    Id0 = 0,
    Id1 = 1,
    Id2 = 2,
    Id3 = 3,
}

impl SwIntrId {
    /// Number of lines per core
    pub const COUNT: usize = 4;

    pub const ALL: [SwIntrId; Self::COUNT] =
        [SwIntrId::Id0, SwIntrId::Id1, SwIntrId::Id2, SwIntrId::Id3];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bit of this line in a pending mask
    pub const fn mask(self) -> u8 {
        1 << (self as u8)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Signal line errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("software interrupt line {0:?} already has a handler")]
    AlreadyBound(SwIntrId),
}

/// Raises a software interrupt on the peer core
pub trait SwIntr {
    fn trigger(&self, id: SwIntrId);
}

impl<T: SwIntr + ?Sized> SwIntr for &T {
    fn trigger(&self, id: SwIntrId) {
        (**self).trigger(id)
    }
}

/// Binds handlers to this core's software interrupt lines
///
/// A bound handler runs each time the peer raises its line. At most one
/// handler per line.
pub trait SwIntrHandlers<'h> {
    /// # Errors
    /// Returns [`SignalError::AlreadyBound`] if the line has a handler.
    fn bind_handler(&self, line: SwIntrId, handler: &'h dyn Fn()) -> Result<(), SignalError>;

    fn unbind_handler(&self, line: SwIntrId);
}

/// Notify capability handed to a queue's producing side
///
/// Called once per published descriptor, after the publish barrier.
pub trait Notify {
    fn notify(&self);
}

/// [`Notify`] that raises one fixed software interrupt line
pub struct SwIntrNotify<'a, T: ?Sized> {
    line: &'a T,
    id: SwIntrId,
}

impl<'a, T: SwIntr + ?Sized> SwIntrNotify<'a, T> {
    pub fn new(line: &'a T, id: SwIntrId) -> Self {
        Self { line, id }
    }

    pub fn id(&self) -> SwIntrId {
        self.id
    }
}

impl<T: SwIntr + ?Sized> Notify for SwIntrNotify<'_, T> {
    fn notify(&self) {
        log::trace!("notify: raising {:?}", self.id);
        self.line.trigger(self.id);
    }
}
