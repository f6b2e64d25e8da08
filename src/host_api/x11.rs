use anyhow::Result;
use tracing::instrument;
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::Drawable,
    Connection,
};

use super::IdleProbe;

pub struct X11IdleProbe {
    connection: Connection,
    preferred_screen: i32,
}

impl X11IdleProbe {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = Connection::connect(None)?;
        Ok(Self {
            connection,
            preferred_screen,
        })
    }
}

impl IdleProbe for X11IdleProbe {
    #[instrument(skip(self))]
    fn idle_ms(&mut self) -> Result<u64> {
        assert!(self.preferred_screen >= 0);

        let setup = self.connection.get_setup();
        let root = setup
            .roots()
            .nth(self.preferred_screen as usize)
            .unwrap()
            .root();
        let cookie = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(cookie)?;
        Ok(reply.ms_since_user_input() as u64)
    }
}
