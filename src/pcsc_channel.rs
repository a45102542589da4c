//! Default `Channel` implementation, backed by PC/SC (component F, default adapter).
//!
//! Grounded on `src/bin/cardinal.rs`/`src/probe.rs`'s `pcsc::Context::establish`/
//! `ctx.connect` usage.

use crate::channel::Channel;
use crate::{Error, Result};
use pcsc::{Card, Protocols, ShareMode};
use tracing::{debug, trace};

pub struct PcscChannel {
    card: Card,
    rbuf: Vec<u8>,
}

impl PcscChannel {
    pub fn connect(ctx: &pcsc::Context, reader: &std::ffi::CStr) -> Result<PcscChannel> {
        debug!(?reader, "connecting to card");
        let card = ctx.connect(reader, ShareMode::Shared, Protocols::T0)?;
        Ok(PcscChannel {
            card,
            rbuf: vec![0; pcsc::MAX_BUFFER_SIZE],
        })
    }

    pub fn list_readers(ctx: &pcsc::Context) -> Result<Vec<std::ffi::CString>> {
        let mut buf = vec![0; ctx.list_readers_len().map_err(Error::Pcsc)?];
        Ok(ctx.list_readers(&mut buf)?.map(|r| r.to_owned()).collect())
    }
}

impl Channel for PcscChannel {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        trace!(?command, ">> TX");
        let response = self.card.transmit(command, &mut self.rbuf)?;
        Ok(response.to_vec())
    }
}
