//! Single-slot, last-write-wins handoff from a receive context (interrupt or
//! radio callback) to the main loop.
//!
//! Internally three buffers rotate between the writer, the reader and a shared
//! "middle" position, so the writer never touches the buffer the reader is
//! copying out of and vice versa:
//!
//! ```text
//!  Producer            middle (atomic)            Consumer
//!  slot[back] --swap--> idx | FRESH  <--swap-- slot[front]
//! ```
//!
//! `write` stages the whole record in the back slot, then publishes it with one
//! `AcqRel` swap. `try_take` swaps the middle out only when FRESH is set, so it
//! always observes a complete record. Neither side loops or waits.

use core::cell::UnsafeCell;
use core::marker::PhantomData;

use portable_atomic::{AtomicU32, AtomicU8, Ordering};

const INDEX_MASK: u8 = 0b011;
const FRESH: u8 = 0b100;

pub struct Mailbox<T> {
    slots: [UnsafeCell<T>; 3],
    middle: AtomicU8,
    // Owned by the producer / consumer respectively; atomics only so the
    // mailbox stays `Sync` and handles can be re-split.
    back: AtomicU8,
    front: AtomicU8,
    overwritten: AtomicU32,
}

// Slots are only reached through one `Producer` and one `Consumer`, which
// never address the same slot at the same time.
unsafe impl<T: Send> Sync for Mailbox<T> {}

impl<T: Copy> Mailbox<T> {
    /// `init` fills the backing slots; it is never handed out by `try_take`.
    pub const fn new(init: T) -> Self {
        Self {
            slots: [
                UnsafeCell::new(init),
                UnsafeCell::new(init),
                UnsafeCell::new(init),
            ],
            middle: AtomicU8::new(1),
            back: AtomicU8::new(0),
            front: AtomicU8::new(2),
            overwritten: AtomicU32::new(0),
        }
    }

    /// Hands out the writer and reader roles. Exclusive access here means no
    /// other handle exists, so the two roles cannot be duplicated.
    pub fn split(&mut self) -> (Producer<'_, T>, Consumer<'_, T>) {
        (
            Producer {
                mailbox: self,
                _not_sync: PhantomData,
            },
            Consumer {
                mailbox: self,
                _not_sync: PhantomData,
            },
        )
    }

    /// Number of values that were replaced before anyone took them.
    pub fn overwritten(&self) -> u32 {
        self.overwritten.load(Ordering::Relaxed)
    }

    fn is_fresh(&self) -> bool {
        self.middle.load(Ordering::Acquire) & FRESH != 0
    }
}

/// Writer role. Move it into the receive callback context.
pub struct Producer<'a, T> {
    mailbox: &'a Mailbox<T>,
    _not_sync: PhantomData<core::cell::Cell<()>>,
}

impl<T: Copy> Producer<'_, T> {
    /// Publish `value`, replacing any value nobody has taken yet.
    pub fn write(&mut self, value: T) {
        let mb = self.mailbox;
        let back = mb.back.load(Ordering::Relaxed);

        // SAFETY: `back` is never the middle or front index, so the consumer
        // cannot be reading this slot.
        unsafe { mb.slots[back as usize].get().write(value) };

        let previous = mb.middle.swap(back | FRESH, Ordering::AcqRel);
        mb.back.store(previous & INDEX_MASK, Ordering::Relaxed);

        if previous & FRESH != 0 {
            mb.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Reader role. Owned by the main loop.
pub struct Consumer<'a, T> {
    mailbox: &'a Mailbox<T>,
    _not_sync: PhantomData<core::cell::Cell<()>>,
}

impl<T: Copy> Consumer<'_, T> {
    /// Take the most recent unread value, if any. Never blocks.
    pub fn try_take(&mut self) -> Option<T> {
        let mb = self.mailbox;
        if !mb.is_fresh() {
            return None;
        }

        // Only the consumer clears FRESH, so the swap below always returns a
        // fresh index even if the producer published again in between.
        let front = mb.front.load(Ordering::Relaxed);
        let previous = mb.middle.swap(front, Ordering::AcqRel);
        let taken = previous & INDEX_MASK;
        mb.front.store(taken, Ordering::Relaxed);

        // SAFETY: `taken` left the middle position, so the producer will not
        // select it as its back slot until we hand it back.
        Some(unsafe { mb.slots[taken as usize].get().read() })
    }

    /// True when a value is waiting; does not consume it.
    pub fn has_new(&self) -> bool {
        self.mailbox.is_fresh()
    }
}
