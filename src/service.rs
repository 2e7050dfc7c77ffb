// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::io::Error;
use std::net::SocketAddr;

use sd_notify::{NotifyState, notify};
use tokio::{
    select,
    signal::unix::{Signal, SignalKind, signal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Reload,
    Shutdown,
}

/// Unix signals steering the service: SIGHUP reloads, SIGINT, SIGTERM and
/// SIGQUIT stop it.
#[derive(Debug)]
pub(crate) struct Signals {
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl Signals {
    pub(crate) fn new() -> Result<Self, Error> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Waits for the next signal. A closed signal stream counts as shutdown.
    pub(crate) async fn next(&mut self) -> Event {
        select! {
            Some(()) = self.hangup.recv() => Event::Reload,
            _ = self.interrupt.recv() => Event::Shutdown,
            _ = self.terminate.recv() => Event::Shutdown,
            _ = self.quit.recv() => Event::Shutdown,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Notifications {}

impl Notifications {
    pub(crate) fn starting() -> Result<(), Error> {
        notify(false, &[NotifyState::Status("starting up")])
    }

    pub(crate) fn ready(address: SocketAddr) -> Result<(), Error> {
        notify(
            false,
            &[
                NotifyState::Ready,
                NotifyState::Status(&format!("serving favorites on {address}")),
            ],
        )
    }

    pub(crate) fn reloading() -> Result<(), Error> {
        notify(
            false,
            &[
                NotifyState::Reloading,
                NotifyState::monotonic_usec_now()?,
                NotifyState::Status("reloading configuration"),
            ],
        )
    }

    pub(crate) fn stopping() -> Result<(), Error> {
        notify(
            false,
            &[NotifyState::Stopping, NotifyState::Status("shutting down")],
        )
    }

    pub(crate) fn failed(code: u32, message: &str) -> Result<(), Error> {
        notify(
            false,
            &[NotifyState::Status(message), NotifyState::Errno(code)],
        )
    }
}
