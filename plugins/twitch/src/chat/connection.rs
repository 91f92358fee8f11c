//! TLS transport to Twitch IRC.

use super::irc::{ChatEvent, IrcMessage};
use crate::auth::tokens::TokenStore;
use eyre::{Context, OptionExt};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_native_tls::TlsConnector;

/// Handle to a running chat connection.
///
/// Lines queued while the connection is down are sent after the next successful login.
#[derive(Debug)]
pub struct ChatConnection {
    outgoing: mpsc::UnboundedSender<String>,
    task: Option<JoinHandle<()>>,
}

impl ChatConnection {
    /// Connects to `addr` (`host:port`) as `login`, reconnecting after `reconnect_delay`
    /// whenever the connection drops. Inbound events go to `events`.
    pub fn connect(
        addr: &str,
        login: &str,
        tokens: TokenStore,
        reconnect_delay: Duration,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Self {
        let (outgoing, mut rx_outgoing) = mpsc::unbounded_channel();
        let addr = addr.to_string();
        let login = login.to_lowercase();

        let task = tokio::spawn(async move {
            loop {
                tracing::debug!(%addr, "connecting to chat");
                match connect_once(&addr, &login, &tokens, &mut rx_outgoing, &events).await {
                    Ok(()) => tracing::info!("chat connection closed"),
                    Err(e) => tracing::warn!(error = %e, "chat connection failed"),
                }
                if events.send(ChatEvent::Disconnected).is_err() {
                    break;
                }
                tokio::time::sleep(reconnect_delay).await;
            }
        });

        Self {
            outgoing,
            task: Some(task),
        }
    }

    /// A connection whose lines go straight to `outgoing`, with nothing on the other end.
    #[cfg(test)]
    pub(crate) fn detached(outgoing: mpsc::UnboundedSender<String>) -> Self {
        Self {
            outgoing,
            task: None,
        }
    }

    pub fn send_line(&self, line: String) {
        if self.outgoing.send(line).is_err() {
            tracing::warn!("chat connection is gone, dropping line");
        }
    }

    pub fn join(&self, channel: &str) {
        self.send_line(format!("JOIN #{channel}"));
    }

    pub fn part(&self, channel: &str) {
        self.send_line(format!("PART #{channel}"));
    }

    pub fn privmsg(&self, channel: &str, text: &str) {
        self.send_line(format!("PRIVMSG #{channel} :{text}"));
    }

    pub fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ChatConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn connect_once(
    addr: &str,
    login: &str,
    tokens: &TokenStore,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::UnboundedSender<ChatEvent>,
) -> eyre::Result<()> {
    let token = tokens
        .access_token()
        .await
        .ok_or_eyre("no access token for chat")?;
    let host = addr.split_once(':').map_or(addr, |(host, _)| host);

    let tcp = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connect to {addr}"))?;
    let connector =
        TlsConnector::from(native_tls::TlsConnector::new().context("build TLS connector")?);
    let stream = connector
        .connect(host, tcp)
        .await
        .with_context(|| format!("TLS handshake with {host}"))?;

    run(stream, login, &token, outgoing, events).await
}

/// Logs in over an established stream and pumps lines both ways until either side closes.
async fn run<S>(
    stream: S,
    login: &str,
    token: &str,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::UnboundedSender<ChatEvent>,
) -> eyre::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();

    for line in [
        format!("PASS oauth:{token}"),
        format!("NICK {login}"),
        "CAP REQ :twitch.tv/commands twitch.tv/tags twitch.tv/membership".to_string(),
    ] {
        write_line(&mut writer, &line).await?;
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("read from chat")? else {
                    return Ok(());
                };
                if line.is_empty() {
                    continue;
                }
                tracing::trace!(%line, "<<");
                let message = IrcMessage::parse(&line);
                if message.command == "PING" {
                    let server = message.trailing.as_deref().unwrap_or("tmi.twitch.tv");
                    let pong = format!("PONG :{server}");
                    write_line(&mut writer, &pong).await?;
                    continue;
                }
                if message.command == "NOTICE"
                    && message.trailing.as_deref() == Some("Login authentication failed")
                {
                    eyre::bail!("chat login rejected");
                }
                if let Some(event) = ChatEvent::from_message(&message) {
                    let reconnect = event == ChatEvent::Disconnected;
                    if events.send(event).is_err() || reconnect {
                        return Ok(());
                    }
                }
            }
            line = outgoing.recv() => {
                let Some(line) = line else {
                    return Ok(());
                };
                write_line(&mut writer, &line).await?;
            }
        }
    }
}

async fn write_line<W>(writer: &mut W, line: &str) -> eyre::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if line.starts_with("PASS ") {
        tracing::trace!(">> PASS ***");
    } else {
        tracing::trace!(%line, ">>");
    }
    writer
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .context("write to chat")?;
    writer.flush().await.context("flush chat writer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn logs_in_answers_ping_and_reports_events() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (tx_out, mut rx_out) = mpsc::unbounded_channel();
        let (tx_events, mut rx_events) = mpsc::unbounded_channel();

        let session = tokio::spawn(async move {
            run(client, "me", "secret", &mut rx_out, &tx_events).await
        });

        server
            .write_all(
                b":tmi.twitch.tv 001 me :Welcome, GLHF!\r\nPING :tmi.twitch.tv\r\n:me!me@me.tmi.twitch.tv JOIN #friend\r\n",
            )
            .await
            .unwrap();
        assert_eq!(rx_events.recv().await, Some(ChatEvent::Connected));
        assert_eq!(
            rx_events.recv().await,
            Some(ChatEvent::Join {
                channel: "friend".into(),
                user: "me".into()
            })
        );

        tx_out.send("PRIVMSG #friend :hi".to_string()).unwrap();
        drop(tx_out);
        session.await.unwrap().unwrap();

        let mut written = String::new();
        server.read_to_string(&mut written).await.unwrap();
        assert_eq!(
            written,
            "PASS oauth:secret\r\n\
             NICK me\r\n\
             CAP REQ :twitch.tv/commands twitch.tv/tags twitch.tv/membership\r\n\
             PONG :tmi.twitch.tv\r\n\
             PRIVMSG #friend :hi\r\n"
        );
    }

    #[tokio::test]
    async fn rejected_login_is_an_error() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (_tx_out, mut rx_out) = mpsc::unbounded_channel();
        let (tx_events, _rx_events) = mpsc::unbounded_channel();

        server
            .write_all(b":tmi.twitch.tv NOTICE * :Login authentication failed\r\n")
            .await
            .unwrap();
        let result = run(client, "me", "bad", &mut rx_out, &tx_events).await;
        assert!(result.is_err());
    }
}
