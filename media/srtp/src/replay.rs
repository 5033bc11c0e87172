use crate::SrtpError;

const WINDOW_SIZE: u64 = 64;

/// Sliding window replay protection over packet indices (RFC 3711 section 3.3.2)
#[derive(Debug, Default, Clone)]
pub(crate) struct ReplayWindow {
    highest: Option<u64>,
    /// Bit `n` set means `highest - n` was received
    bitmap: u64,
}

impl ReplayWindow {
    pub(crate) fn check(&self, index: u64) -> Result<(), SrtpError> {
        let Some(highest) = self.highest else {
            return Ok(());
        };

        if index > highest {
            return Ok(());
        }

        let delta = highest - index;

        if delta >= WINDOW_SIZE {
            return Err(SrtpError::ReplayOld);
        }

        if self.bitmap & (1 << delta) != 0 {
            return Err(SrtpError::ReplayFail);
        }

        Ok(())
    }

    /// Mark an index as received, must only be called after the packet was authenticated
    pub(crate) fn update(&mut self, index: u64) {
        let Some(highest) = self.highest else {
            self.highest = Some(index);
            self.bitmap = 1;
            return;
        };

        if index > highest {
            let shift = index - highest;
            self.bitmap = if shift >= WINDOW_SIZE {
                0
            } else {
                self.bitmap << shift
            };
            self.bitmap |= 1;
            self.highest = Some(index);
        } else {
            self.bitmap |= 1 << (highest - index);
        }
    }
}
