/// The strand: a fixed-length, ordered run of slots that each may hold a tone.
///
/// Slot order is playback order. A tone sits in at most one slot at a time;
/// placing it somewhere new vacates wherever it was before.
use crate::error::{HelixError, Result};
use crate::tone::Tone;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    index: usize,
    occupant: Option<Tone>,
}

impl Slot {
    fn new(index: usize) -> Self {
        Self {
            index,
            occupant: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn occupant(&self) -> Option<Tone> {
        self.occupant
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SlotTrack {
    slots: Vec<Slot>,
}

impl SlotTrack {
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(HelixError::Configuration(
                "a track needs at least one slot".to_string(),
            ));
        }

        Ok(Self {
            slots: (0..len).map(Slot::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(HelixError::OutOfRange {
                index,
                len: self.slots.len(),
            })
        }
    }

    /// Places `tone` at `index`, moving it off any slot it held before.
    ///
    /// Range is checked before occupancy. Placing a tone on the slot it
    /// already holds succeeds without changing anything.
    pub fn assign(&mut self, tone: Tone, index: usize) -> Result<Slot> {
        self.check_index(index)?;

        match self.slots[index].occupant {
            Some(occupant) if occupant == tone => return Ok(self.slots[index]),
            Some(occupant) => return Err(HelixError::SlotOccupied { index, occupant }),
            None => {}
        }

        if let Some(previous) = self.position_of(tone) {
            debug!("{} leaves slot {}", tone, previous);
            self.slots[previous].occupant = None;
        }

        self.slots[index].occupant = Some(tone);
        debug!("{} placed on slot {}", tone, index);
        Ok(self.slots[index])
    }

    /// Clears the slot at `index` and returns what it held. Clearing an
    /// empty slot is not an error.
    pub fn unassign(&mut self, index: usize) -> Result<Option<Tone>> {
        self.check_index(index)?;

        let previous = self.slots[index].occupant.take();
        if let Some(tone) = previous {
            debug!("{} removed from slot {}", tone, index);
        }
        Ok(previous)
    }

    pub fn query(&self, index: usize) -> Result<Option<Tone>> {
        self.check_index(index)?;
        Ok(self.slots[index].occupant)
    }

    /// Index of the slot currently holding `tone`, if any.
    pub fn position_of(&self, tone: Tone) -> Option<usize> {
        self.slots
            .iter()
            .find(|slot| slot.occupant == Some(tone))
            .map(|slot| slot.index)
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_occupied()).count()
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.occupant = None;
        }
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            entries: self
                .slots
                .iter()
                .map(|slot| (slot.index, slot.occupant))
                .collect(),
        }
    }
}

/// Owned copy of a track's state, in slot order. Later changes to the
/// track are never visible through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSnapshot {
    entries: Vec<(usize, Option<Tone>)>,
}

impl TrackSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(usize, Option<Tone>)] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<Tone> {
        self.entries.get(index).and_then(|(_, occupant)| *occupant)
    }

    /// Occupied slots only, in slot order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, Tone)> + '_ {
        self.entries
            .iter()
            .filter_map(|(index, occupant)| occupant.map(|tone| (*index, tone)))
    }
}
