//! Fuzz target for the server connection state machine
//!
//! Feeds arbitrary packet, timer and close sequences into a `ServerSession`.
//!
//! # Invariants
//!
//! - The login kick and the keep-alive watchdog are never armed together
//! - `LoggedIn` is reported at most once, `LoggedOut` only after it
//! - Nothing follows a requested close, and `end` runs its cleanup once
//! - Probes only go out while the watchdog is active

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use lodestone_proto::{
    Handshake, KeepAlive, LoginStart, OpaquePacket, Packet, Ping, ProtocolState, StatusResponse,
};
use lodestone_server::{ServerSession, SessionAction, SessionConfig};

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    Handshake { next_state: i8 },
    StatusRequest,
    Ping { time: i64 },
    LoginStart { username: String },
    KeepAlive { id: i32 },
    StrayStatusResponse,
    Opaque { state: u8, id: u8, body: Vec<u8> },
    LoginTimer,
    KeepAliveTick { probe_id: i32 },
    Advance { millis: u16 },
    End,
}

fn state(n: u8) -> ProtocolState {
    match n % 4 {
        0 => ProtocolState::Handshaking,
        1 => ProtocolState::Status,
        2 => ProtocolState::Login,
        _ => ProtocolState::Play,
    }
}

fn packet(input: &Input) -> Option<Packet> {
    Some(match input {
        Input::Handshake { next_state } => Packet::Handshake(Handshake {
            protocol_version: 47,
            server_host: "localhost".to_string(),
            server_port: 25565,
            next_state: i32::from(*next_state),
        }),
        Input::StatusRequest => Packet::StatusRequest,
        Input::Ping { time } => Packet::Ping(Ping { time: *time }),
        Input::LoginStart { username } => {
            Packet::LoginStart(LoginStart { username: username.clone() })
        },
        Input::KeepAlive { id } => Packet::KeepAlive(KeepAlive { keep_alive_id: *id }),
        Input::StrayStatusResponse => {
            Packet::StatusResponse(StatusResponse { response: "{}".to_string() })
        },
        Input::Opaque { state: s, id, body } => Packet::Opaque(OpaquePacket {
            state: state(*s),
            id: *id,
            body: Bytes::from(body.clone()),
        }),
        _ => return None,
    })
}

fuzz_target!(|inputs: Vec<Input>| {
    let start = Instant::now();
    let mut now = start;
    let config = SessionConfig {
        kick_timeout: Duration::from_millis(10_000),
        check_interval: Duration::from_millis(4_000),
    };
    let (mut session, _) = ServerSession::accept(config);

    let mut logged_in = 0;
    let mut logged_out = 0;
    let mut closed = false;
    let mut ended = false;

    for input in &inputs {
        let actions = match input {
            Input::LoginTimer => session.login_timer_fired(),
            Input::KeepAliveTick { probe_id } => {
                let active = session.keep_alive_active();
                let actions = session.keep_alive_tick(now, *probe_id);
                if actions.iter().any(|a| matches!(a, SessionAction::Send(_))) {
                    assert!(active, "probe sent without an active watchdog");
                }
                actions
            },
            Input::Advance { millis } => {
                now += Duration::from_millis(u64::from(*millis));
                Vec::new()
            },
            Input::End => {
                let actions = session.end();
                if ended {
                    assert!(actions.is_empty(), "end cleaned up twice");
                }
                ended = true;
                actions
            },
            other => match packet(other) {
                Some(packet) => session.handle_packet(packet, now),
                None => Vec::new(),
            },
        };

        if (closed || ended) && !matches!(input, Input::End) {
            assert!(actions.is_empty(), "actions after close: {actions:?}");
        }

        for action in &actions {
            match action {
                SessionAction::LoggedIn { .. } => logged_in += 1,
                SessionAction::LoggedOut { .. } => logged_out += 1,
                SessionAction::Close { .. } => closed = true,
                _ => {},
            }
        }

        assert!(logged_in <= 1, "logged in twice");
        assert!(logged_out <= logged_in, "logout without login");
        assert!(
            !(session.login_kick_armed() && session.keep_alive_active()),
            "login kick and keep-alive armed together"
        );
    }
});
