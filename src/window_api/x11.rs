use std::time::Duration;

use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::instrument;
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::{self, Atom, Drawable, GetProperty, GrabServer, InternAtom, UngrabServer, Window, ATOM_ANY},
    Connection,
};

use super::{ActiveWindowData, SystemActivity, WindowManager};

/// `ScreenSaverOn` state of the screensaver extension. Screen lockers activate the saver.
const SCREEN_SAVER_ON: u8 = 1;

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

fn get_active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    result
        .value::<Window>()
        .first()
        .copied()
        .ok_or_else(|| anyhow!("No active window"))
}

fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).to_string())
}

pub struct LinuxWindowManager {
    connection: Connection,
    preferred_screen: usize,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
    system: System,
}

impl LinuxWindowManager {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen: preferred_screen.max(0) as usize,
            active_window_atom,
            window_name_atom,
            pid_atom,
            system: System::new(),
        })
    }

    /// Currently only 1 x11 screen is supported.
    fn root(&self) -> Result<Window> {
        self.connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen)
            .map(|screen| screen.root())
            .ok_or_else(|| anyhow!("Screen {} doesn't exist", self.preferred_screen))
    }

    fn process_path(&mut self, id: u32) -> Option<String> {
        let pid = Pid::from_u32(id);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .and_then(|process| process.exe())
            .and_then(|v| v.to_str())
            .map(|v| v.to_string())
    }

    #[instrument(skip(self))]
    fn get_active_inner(&mut self) -> Result<ActiveWindowData> {
        let root = self.root()?;
        let active_window = get_active_window(&self.connection, &root, self.active_window_atom)?;
        let window_name = get_name(&self.connection, active_window, self.window_name_atom)?;
        let pid = get_pid(&self.connection, active_window, self.pid_atom)?
            .ok_or_else(|| anyhow!("Active window doesn't expose a pid"))?;
        let process_name = self
            .process_path(pid)
            .ok_or_else(|| anyhow!("Couldn't find executable of process {pid}"))?;
        Ok(ActiveWindowData {
            window_title: window_name.into(),
            process_name: process_name.into(),
            icon: vec![],
        })
    }

    fn query_screensaver(&self) -> Result<QueryInfoReply> {
        let root = self.root()?;
        let info = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        Ok(self.connection.wait_for_reply(info)?)
    }
}

impl WindowManager for LinuxWindowManager {
    #[instrument(skip(self))]
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData> {
        let _ = self.connection.send_request(&GrabServer {});
        let result = self.get_active_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }
}

impl SystemActivity for LinuxWindowManager {
    #[instrument(skip(self))]
    fn get_idle_time(&mut self) -> Result<Duration> {
        let reply = self.query_screensaver()?;
        Ok(Duration::from_millis(reply.ms_since_user_input() as u64))
    }

    #[instrument(skip(self))]
    fn is_screen_locked(&mut self) -> Result<bool> {
        let reply = self.query_screensaver()?;
        Ok(reply.state() == SCREEN_SAVER_ON)
    }
}
