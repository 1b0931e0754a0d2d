use crate::instructions::{RegisterType, WordType, REG_COUNT};
use crate::reservation_station::Tag;

struct RegEntry {
    value: WordType,
    // the station that will produce the next value, if any
    producer: Option<Tag>,
}

/// The architectural register file with renaming state. A register is ready
/// iff no producer tag is set; at most one tag is live per register and the
/// newest issue overwrites it. Values are written only at commit, never
/// eagerly on a broadcast; consumers in flight get values through
/// station-level forwarding.
pub(crate) struct RegisterStatus {
    entries: Vec<RegEntry>,
}

impl RegisterStatus {
    pub(crate) fn new() -> RegisterStatus {
        let mut entries = Vec::with_capacity(REG_COUNT as usize);
        for _ in 0..REG_COUNT {
            entries.push(RegEntry { value: 0, producer: None });
        }
        RegisterStatus { entries }
    }

    pub(crate) fn get_value(&self, reg: RegisterType) -> WordType {
        self.entries[reg as usize].value
    }

    pub(crate) fn get_status(&self, reg: RegisterType) -> Option<Tag> {
        self.entries[reg as usize].producer
    }

    pub(crate) fn set_status(&mut self, reg: RegisterType, producer: Tag) {
        self.entries[reg as usize].producer = Some(producer);
    }

    #[allow(dead_code)]
    pub(crate) fn is_ready(&self, reg: RegisterType) -> bool {
        self.entries[reg as usize].producer.is_none()
    }

    pub(crate) fn update_on_commit(&mut self, reg: RegisterType, value: WordType) {
        let entry = &mut self.entries[reg as usize];
        entry.value = value;
        entry.producer = None;
    }
}
