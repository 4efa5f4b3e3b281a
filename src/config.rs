use crate::Error;

/// Tunables shared by every protocol instance run by an [`Engine`](crate::Engine).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Domain separation label mixed into every KDF call.
    pub protocol_info: Vec<u8>,
    /// Number of digits in each displayed half of the short authentication string.
    pub sas_digits: u32,
    /// Ratchet index handed to the channel store when a channel is installed.
    pub channel_ratchet_index: u32,
}

impl EngineConfig {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !(1..=9).contains(&self.sas_digits) {
            return Err(Error::Config(format!(
                "SAS length must be between 1 and 9 digits, got {}",
                self.sas_digits
            )));
        }

        if self.protocol_info.is_empty() {
            return Err(Error::Config("protocol info must not be empty".to_string()));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol_info: b"Concord-Handshake-v1".to_vec(),
            sas_digits: 4,
            channel_ratchet_index: 0,
        }
    }
}
