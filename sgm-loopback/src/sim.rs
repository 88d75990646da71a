//! Tick-driven simulation of one server and its clients.
//!
//! Each [`Simulation::step`] polls the server, relays any chat lines it
//! collected, then polls every client in id order. Scripted actions
//! (session info requests, chat, a spawn broadcast) fire on the rounds
//! named in [`SimulationConfig`](crate::config::SimulationConfig).

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, info, warn};

use sgm_core::protocol::{InstantiateRemoteObject, Message, SessionInfo};
use sgm_core::{
    CONTROL_CHANNEL, Channel, Client, ClientObserver, ConnectionError, LoopbackAuth,
    LoopbackNetwork, LoopbackTransport, Packet, PacketKind, PeerId, PlayerStatus, PumpStats,
    Result, SendType, Server, ServerObserver, SessionError, Vector3,
};

use crate::config::LoopbackConfig;

/// Kind header of chat lines on the data channel.
pub const CHAT_KIND: u64 = 0x4000;

/// Prefab named in the scripted spawn.
pub const SPAWN_PREFAB: &str = "crate";

type SimServer = Server<LoopbackTransport, LoopbackAuth>;
type SimClientRole = Client<LoopbackTransport, LoopbackAuth>;

// ── Observers ────────────────────────────────────────────────────

struct ServerTap {
    channel: Channel,
    events: Rc<RefCell<Vec<String>>>,
    inbox: Rc<RefCell<Vec<(PeerId, String)>>>,
}

impl ServerObserver for ServerTap {
    fn on_data_received(&mut self, sender: PeerId, packet: &mut Packet, channel: Channel) {
        if channel != self.channel || packet.read::<u64>().ok() != Some(CHAT_KIND) {
            return;
        }
        match packet.read::<String>() {
            Ok(line) => self.inbox.borrow_mut().push((sender, line)),
            Err(e) => warn!(%sender, "unreadable chat line: {e}"),
        }
    }

    fn on_player_connected(&mut self, peer: PeerId) {
        self.events.borrow_mut().push(format!("{peer} connected"));
    }

    fn on_player_authenticated(&mut self, peer: PeerId) {
        self.events.borrow_mut().push(format!("{peer} authenticated"));
    }

    fn on_player_disconnected(&mut self, peer: PeerId, error: SessionError) {
        self.events
            .borrow_mut()
            .push(format!("{peer} disconnected ({error})"));
    }

    fn on_shutdown(&mut self) {
        self.events.borrow_mut().push("server shut down".into());
    }
}

#[derive(Debug, Default)]
struct ClientTally {
    chats: Vec<String>,
    spawns: Vec<String>,
    closed: Option<String>,
}

struct ClientTap {
    channel: Channel,
    tally: Rc<RefCell<ClientTally>>,
}

impl ClientObserver for ClientTap {
    fn on_data_received(&mut self, _sender: PeerId, packet: &mut Packet, channel: Channel) {
        let Ok(kind) = packet.read::<u64>() else {
            return;
        };
        if channel == self.channel && kind == CHAT_KIND {
            if let Ok(line) = packet.read::<String>() {
                self.tally.borrow_mut().chats.push(line);
            }
        } else if channel == CONTROL_CHANNEL && kind == u64::from(PacketKind::InstantiateRemoteObject) {
            if let Ok(spawn) = InstantiateRemoteObject::decode(packet) {
                self.tally.borrow_mut().spawns.push(spawn.prefab);
            }
        }
    }

    fn on_connection_closed(
        &mut self,
        _server: PeerId,
        error: ConnectionError,
        reason: Option<&str>,
    ) {
        let text = match reason {
            Some(reason) => format!("{error}: {reason}"),
            None => error.to_string(),
        };
        self.tally.borrow_mut().closed = Some(text);
    }
}

// ── Report ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PlayerReport {
    pub peer: PeerId,
    pub name: Option<String>,
    pub status: PlayerStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerReport {
    pub name: String,
    pub max_players: usize,
    /// Entries still waiting on authentication.
    pub pending: usize,
    pub in_server: usize,
    pub players: Vec<PlayerReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientReport {
    pub peer: PeerId,
    pub name: String,
    pub status: String,
    pub connected: bool,
    pub chats: Vec<String>,
    pub spawns: Vec<String>,
    pub closed: Option<String>,
    pub session: Option<SessionInfo>,
}

/// State of the simulation after some number of rounds.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub ticks: u32,
    pub server: ServerReport,
    pub clients: Vec<ClientReport>,
    pub traffic: PumpStats,
    pub messages_sent: usize,
    pub events: Vec<String>,
}

impl SimReport {
    pub fn connected_clients(&self) -> usize {
        self.clients.iter().filter(|c| c.connected).count()
    }
}

// ── Simulation ───────────────────────────────────────────────────

struct SimClient {
    role: SimClientRole,
    tally: Rc<RefCell<ClientTally>>,
    info_requested: bool,
}

pub struct Simulation {
    config: LoopbackConfig,
    network: LoopbackNetwork,
    server: SimServer,
    clients: Vec<SimClient>,
    events: Rc<RefCell<Vec<String>>>,
    inbox: Rc<RefCell<Vec<(PeerId, String)>>>,
    traffic: PumpStats,
    tick: u32,
}

impl Simulation {
    pub fn new(config: LoopbackConfig) -> Self {
        let network = LoopbackNetwork::new();
        let server_id = config.server_id();
        let channel = config.simulation.data_channel;

        let server_auth = LoopbackAuth::new(server_id);
        server_auth.set_secure(config.simulation.secure);
        let mut server = Server::new(
            network.endpoint(server_id),
            server_auth.clone(),
            config.server.clone(),
        );
        if !server.add_channel(channel) {
            warn!(channel, "data channel not registered");
        }
        let events = Rc::new(RefCell::new(Vec::new()));
        let inbox = Rc::new(RefCell::new(Vec::new()));
        server.add_observer(ServerTap {
            channel,
            events: Rc::clone(&events),
            inbox: Rc::clone(&inbox),
        });

        let clients = config
            .client_configs()
            .into_iter()
            .map(|(peer, client_config)| {
                if config.clients.rejected.contains(&client_config.display_name) {
                    server_auth.reject_peer(peer);
                }
                let mut role = Client::new(network.endpoint(peer), LoopbackAuth::new(peer), client_config);
                role.add_channel(channel);
                let tally = Rc::new(RefCell::new(ClientTally::default()));
                role.add_observer(ClientTap {
                    channel,
                    tally: Rc::clone(&tally),
                });
                SimClient {
                    role,
                    tally,
                    info_requested: false,
                }
            })
            .collect();

        Self {
            config,
            network,
            server,
            clients,
            events,
            inbox,
            traffic: PumpStats::default(),
            tick: 0,
        }
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Point every client at the server.
    pub fn start(&mut self) -> Result<()> {
        let server_id = self.config.server_id();
        info!(server = %server_id, clients = self.clients.len(), "simulation starting");
        for client in &mut self.clients {
            client.role.connect_to(server_id)?;
        }
        Ok(())
    }

    /// Run one round.
    pub fn step(&mut self) {
        self.tick += 1;
        let channel = self.config.simulation.data_channel;

        self.traffic += self.server.poll();
        self.relay_chat(channel);
        if self.tick == self.config.simulation.spawn_tick {
            let position = Vector3::new(self.tick as f32, 0.0, 0.0);
            if let Err(e) = self.server.instantiate_at(SPAWN_PREFAB, position) {
                warn!("spawn broadcast failed: {e}");
            }
        }

        for client in &mut self.clients {
            self.traffic += client.role.poll();
            if !client.role.is_connected() {
                continue;
            }
            if !client.info_requested {
                client.info_requested = true;
                if let Err(e) = client.role.request_session_info() {
                    warn!("session info request failed: {e}");
                }
            }
            if self.tick == self.config.simulation.chat_tick {
                let name = client.role.config().display_name.clone();
                let mut packet = client.role.create_packet(CHAT_KIND);
                let sent = packet
                    .write(format!("hello from {name}"))
                    .and_then(|()| client.role.send(&mut packet, SendType::Reliable, channel));
                if let Err(e) = sent {
                    warn!(%name, "chat send failed: {e}");
                }
            }
        }
        debug!(tick = self.tick, packets = self.traffic.total(), "round complete");
    }

    /// Start, then run `ticks` rounds without delay.
    pub fn run(&mut self, ticks: u32) -> Result<SimReport> {
        self.start()?;
        for _ in 0..ticks {
            self.step();
        }
        Ok(self.report())
    }

    /// Every client still attached leaves, then the server shuts down.
    pub fn finish(&mut self) {
        for client in &mut self.clients {
            if client.role.target().is_some() {
                if let Err(e) = client.role.leave() {
                    warn!("leave failed: {e}");
                }
            }
        }
        self.traffic += self.server.poll();
        self.server.shutdown();
        info!(ticks = self.tick, packets = self.traffic.total(), "simulation finished");
    }

    pub fn report(&self) -> SimReport {
        let registry = self.server.registry();
        let players = self
            .server
            .players()
            .into_iter()
            .map(|(peer, status)| PlayerReport {
                peer,
                name: self.server.player_name(peer).map(str::to_owned),
                status,
            })
            .collect();

        let clients = self
            .clients
            .iter()
            .map(|c| {
                let tally = c.tally.borrow();
                ClientReport {
                    peer: c.role.local_identity(),
                    name: c.role.config().display_name.clone(),
                    status: c.role.status().to_string(),
                    connected: c.role.is_connected(),
                    chats: tally.chats.clone(),
                    spawns: tally.spawns.clone(),
                    closed: tally.closed.clone(),
                    session: c.role.session_info().cloned(),
                }
            })
            .collect();

        SimReport {
            ticks: self.tick,
            server: ServerReport {
                name: self.server.name().to_owned(),
                max_players: self.server.max_players(),
                pending: registry.count(PlayerStatus::Pending),
                in_server: registry.count(PlayerStatus::InServer),
                players,
            },
            clients,
            traffic: self.traffic,
            messages_sent: self.network.sent().len(),
            events: self.events.borrow().clone(),
        }
    }

    fn relay_chat(&mut self, channel: Channel) {
        let lines: Vec<_> = self.inbox.borrow_mut().drain(..).collect();
        for (sender, line) in lines {
            let mut packet = self.server.create_packet(CHAT_KIND);
            let sent = packet
                .write(line.as_str())
                .and_then(|()| self.server.send(&mut packet, SendType::Reliable, channel, &[]));
            if let Err(e) = sent {
                warn!(%sender, "chat relay failed: {e}");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
