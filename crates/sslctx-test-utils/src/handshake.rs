// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! In-memory TLS handshakes.
//!
//! Drives a rustls client and server against each other through byte
//! buffers, no sockets involved.

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, Connection, ServerConfig, ServerConnection};
use std::sync::Arc;

const MAX_ROUNDS: usize = 10;

/// What the client observed after a completed handshake.
#[derive(Debug)]
pub struct HandshakeOutcome {
    /// Certificates the server presented, leaf first.
    pub peer_certificates: Vec<CertificateDer<'static>>,
    /// Negotiated ALPN protocol.
    pub alpn_protocol: Option<Vec<u8>>,
    /// SNI the server received.
    pub server_name: Option<String>,
    /// Whether the server received a client certificate.
    pub client_authenticated: bool,
}

/// Run a full handshake between `client` and `server`, connecting to `server_name`.
pub fn handshake(
    client: Arc<ClientConfig>,
    server: Arc<ServerConfig>,
    server_name: &str,
) -> Result<HandshakeOutcome, rustls::Error> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| rustls::Error::General(e.to_string()))?;
    let mut client = Connection::from(ClientConnection::new(client, name)?);
    let mut server = Connection::from(ServerConnection::new(server)?);

    for _ in 0..MAX_ROUNDS {
        if !client.is_handshaking() && !server.is_handshaking() {
            break;
        }
        transfer(&mut client, &mut server)?;
        transfer(&mut server, &mut client)?;
    }

    if client.is_handshaking() || server.is_handshaking() {
        return Err(rustls::Error::General("handshake did not complete".to_string()));
    }

    let received_sni = match &server {
        Connection::Server(conn) => conn.server_name().map(str::to_string),
        Connection::Client(_) => None,
    };

    Ok(HandshakeOutcome {
        peer_certificates: client
            .peer_certificates()
            .map(|certs| certs.iter().map(|cert| cert.clone().into_owned()).collect())
            .unwrap_or_default(),
        alpn_protocol: client.alpn_protocol().map(<[u8]>::to_vec),
        server_name: received_sni,
        client_authenticated: server.peer_certificates().is_some(),
    })
}

fn transfer(from: &mut Connection, to: &mut Connection) -> Result<(), rustls::Error> {
    let mut buffer = Vec::new();
    while from.wants_write() {
        from.write_tls(&mut buffer)
            .map_err(|e| rustls::Error::General(e.to_string()))?;
    }

    let mut pending = &buffer[..];
    while !pending.is_empty() {
        to.read_tls(&mut pending)
            .map_err(|e| rustls::Error::General(e.to_string()))?;
        to.process_new_packets()?;
    }
    Ok(())
}
