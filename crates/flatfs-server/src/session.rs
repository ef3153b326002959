/// Mounted clients, keyed by session id. Ids run from 1 to the capacity and
/// are reused after unmount; 0 is never handed out.
pub struct SessionTable<W> {
    slots: Vec<Option<W>>,
}

impl<W> SessionTable<W> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `channel` under the lowest free id. A full table hands the
    /// channel back.
    pub fn insert(&mut self, channel: W) -> Result<i32, W> {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(channel);
                Ok(index as i32 + 1)
            }
            None => Err(channel),
        }
    }

    pub fn get_mut(&mut self, session: i32) -> Option<&mut W> {
        let index = Self::index(session)?;
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn remove(&mut self, session: i32) -> Option<W> {
        let index = Self::index(session)?;
        self.slots.get_mut(index)?.take()
    }

    fn index(session: i32) -> Option<usize> {
        usize::try_from(session).ok()?.checked_sub(1)
    }
}
