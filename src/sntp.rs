//! ==============================================================================
//! sntp.rs - network time source
//! ==============================================================================
//!
//! purpose:
//!     fetches wall-clock time from an ntp server (rfc 5905, client mode)
//!     and turns it into a local time of day.
//!
//! relationships:
//!     - used by: clock.rs (PersistentClock::sync_from_network)
//!     - configured by: config.rs ([time] section)
//!
//! one request, one bounded wait, no retries: a failed fetch is reported to
//! the caller, which keeps the stale time and tries again next boot.
//!
//! ==============================================================================

use anyhow::{anyhow, bail, Context, Result};
use std::future::Future;
use time::OffsetDateTime;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::config::TimeConfig;
use crate::domain::TimeOfDay;

/// seconds between the ntp era (1900) and the unix epoch (1970)
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

const PACKET_LEN: usize = 48;

/// li = 0, version = 4, mode = 3 (client)
const CLIENT_HEADER: u8 = 0x23;

/// anything that can tell the time over the network
pub trait NetworkTimeSource {
    fn fetch_time(&mut self, cfg: &TimeConfig) -> impl Future<Output = Result<TimeOfDay>>;
}

#[derive(Debug, Default)]
pub struct SntpClient;

impl SntpClient {
    pub fn new() -> Self {
        Self
    }
}

impl NetworkTimeSource for SntpClient {
    async fn fetch_time(&mut self, cfg: &TimeConfig) -> Result<TimeOfDay> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind sntp socket")?;
        socket
            .connect((cfg.server.as_str(), cfg.port))
            .await
            .with_context(|| format!("failed to resolve {}:{}", cfg.server, cfg.port))?;

        let mut request = [0u8; PACKET_LEN];
        request[0] = CLIENT_HEADER;
        socket.send(&request).await.context("failed to send sntp request")?;

        let mut reply = [0u8; 512];
        let len = tokio::time::timeout(cfg.timeout(), socket.recv(&mut reply))
            .await
            .map_err(|_| anyhow!("no reply from {} within {:?}", cfg.server, cfg.timeout()))?
            .context("failed to receive sntp reply")?;

        let ntp_secs = parse_reply(&reply[..len])?;
        debug!(server = %cfg.server, ntp_secs, "sntp reply");
        local_time(ntp_secs, cfg.gmt_offset_secs + cfg.dst_offset_secs)
    }
}

/// transmit timestamp (whole seconds) from a server reply
pub fn parse_reply(buf: &[u8]) -> Result<u32> {
    if buf.len() < PACKET_LEN {
        bail!("short sntp reply ({} bytes)", buf.len());
    }
    let mode = buf[0] & 0x07;
    if mode != 4 && mode != 5 {
        bail!("unexpected sntp mode {}", mode);
    }
    if buf[1] == 0 {
        bail!("kiss-o'-death from server");
    }
    let secs = u32::from_be_bytes([buf[40], buf[41], buf[42], buf[43]]);
    if secs == 0 {
        bail!("server sent a zero transmit timestamp");
    }
    Ok(secs)
}

/// ntp seconds plus a local offset, split into hour/minute/second
pub fn local_time(ntp_secs: u32, offset_secs: i64) -> Result<TimeOfDay> {
    let unix = i64::from(ntp_secs) - NTP_UNIX_OFFSET + offset_secs;
    let dt = OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|e| anyhow!("timestamp {} out of range: {}", unix, e))?;
    Ok(TimeOfDay::new(dt.hour(), dt.minute(), dt.second()))
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// 2023-11-14 14:30:00 utc
    const NTP_1430: u32 = (1_699_972_200 + NTP_UNIX_OFFSET) as u32;

    fn reply_with(secs: u32) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[0] = 0x24; // version 4, server mode
        buf[1] = 2;
        buf[40..44].copy_from_slice(&secs.to_be_bytes());
        buf
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply(&reply_with(NTP_1430)).unwrap(), NTP_1430);
    }

    #[test]
    fn test_rejects_bad_replies() {
        assert!(parse_reply(&[0u8; 12]).is_err());

        let mut client_mode = reply_with(NTP_1430);
        client_mode[0] = CLIENT_HEADER;
        assert!(parse_reply(&client_mode).is_err());

        let mut kod = reply_with(NTP_1430);
        kod[1] = 0;
        assert!(parse_reply(&kod).is_err());

        assert!(parse_reply(&reply_with(0)).is_err());
    }

    #[test]
    fn test_local_time_offsets() {
        assert_eq!(local_time(NTP_1430, 0).unwrap(), TimeOfDay::new(14, 30, 0));
        // gmt+1 plus one hour of daylight saving
        assert_eq!(local_time(NTP_1430, 3600 + 3600).unwrap(), TimeOfDay::new(16, 30, 0));
        // wraps past midnight
        assert_eq!(local_time(NTP_1430, 10 * 3600).unwrap(), TimeOfDay::new(0, 30, 0));
    }

    #[tokio::test]
    async fn test_fetch_from_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; PACKET_LEN];
            let (_, from) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(buf[0] & 0x07, 3);
            server.send_to(&reply_with(NTP_1430), from).await.unwrap();
        });

        let cfg = TimeConfig {
            server: "127.0.0.1".to_string(),
            port,
            timeout_ms: 2000,
            ..TimeConfig::default()
        };
        let time = SntpClient::new().fetch_time(&cfg).await.unwrap();
        assert_eq!(time, TimeOfDay::new(14, 30, 0));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        // bound but silent
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let cfg = TimeConfig {
            server: "127.0.0.1".to_string(),
            port: silent.local_addr().unwrap().port(),
            timeout_ms: 100,
            ..TimeConfig::default()
        };
        assert!(SntpClient::new().fetch_time(&cfg).await.is_err());
    }
}
