use a2ui_runtime::{ClientEvent, DispatchId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;

pub const INBOUND_FRAME_CAP: usize = 1_048_576;
pub const OUTBOUND_FRAME_CAP: usize = 4_194_304;

/// How envelopes are delimited on stdio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Framing {
    /// One JSON document per line.
    #[default]
    Lines,
    /// Big-endian u32 length prefix, then the JSON payload.
    Packet4,
}

impl Framing {
    pub fn as_str(self) -> &'static str {
        match self {
            Framing::Lines => "lines",
            Framing::Packet4 => "packet4",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lines" | "jsonl" => Some(Framing::Lines),
            "packet4" | "packet-4" => Some(Framing::Packet4),
            _ => None,
        }
    }
}

/// Host to peer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", rename_all = "camelCase")]
pub enum Outbound {
    #[serde(rename_all = "camelCase")]
    Ready {
        surface_id: String,
        capabilities: Value,
    },
    /// Render view of one surface. `tree` is null once the surface is
    /// deleted or while its root is missing.
    #[serde(rename_all = "camelCase")]
    Snapshot {
        surface_id: String,
        root: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        catalog_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        styles: Option<Value>,
        tree: Value,
    },
    Event { id: DispatchId, event: ClientEvent },
    Errors { errors: Vec<String> },
}

/// Peer to host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase")]
pub enum Inbound {
    /// One server message or an array of them.
    Messages { messages: Value },
    #[serde(rename_all = "camelCase")]
    Action {
        #[serde(default)]
        surface_id: Option<String>,
        component_id: String,
        #[serde(default)]
        data_context_path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SetData {
        #[serde(default)]
        surface_id: Option<String>,
        path: String,
        value: Value,
        #[serde(default)]
        data_context_path: Option<String>,
    },
    Reply {
        id: DispatchId,
        #[serde(default)]
        messages: Vec<Value>,
    },
}

pub fn errors_envelope(errors: Vec<String>) -> Outbound {
    Outbound::Errors { errors }
}

pub async fn writer_loop<W>(
    writer: W,
    framing: Framing,
    mut rx: mpsc::Receiver<Outbound>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = writer;

    while let Some(envelope) = rx.recv().await {
        let payload = encode_outbound(&envelope)?;
        write_frame(&mut writer, framing, &payload, OUTBOUND_FRAME_CAP).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Forwards decoded envelopes until EOF. Undecodable frames are passed on as
/// error strings so the session can report them without stopping.
pub async fn reader_loop<R>(
    reader: R,
    framing: Framing,
    tx: mpsc::Sender<Result<Inbound, String>>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);

    loop {
        match read_frame(&mut reader, framing, INBOUND_FRAME_CAP).await {
            Ok(payload) => {
                let decoded =
                    decode_inbound(&payload).map_err(|err| format!("invalid envelope: {err}"));
                if tx.send(decoded).await.is_err() {
                    return Ok(());
                }
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

fn encode_outbound(envelope: &Outbound) -> io::Result<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(json_error)
}

fn decode_inbound(payload: &[u8]) -> Result<Inbound, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Reads one frame. End of input surfaces as `UnexpectedEof`; blank lines are
/// skipped in line mode.
pub async fn read_frame<R>(
    reader: &mut R,
    framing: Framing,
    max_payload: usize,
) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    match framing {
        Framing::Lines => loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            check_len(line.len(), max_payload)?;
            return Ok(line);
        },
        Framing::Packet4 => {
            let mut len_buf = [0_u8; 4];
            reader.read_exact(&mut len_buf).await?;

            let len = u32::from_be_bytes(len_buf) as usize;
            check_len(len, max_payload)?;

            let mut payload = vec![0_u8; len];
            reader.read_exact(&mut payload).await?;
            Ok(payload)
        }
    }
}

pub async fn write_frame<W>(
    writer: &mut W,
    framing: Framing,
    payload: &[u8],
    max_payload: usize,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    check_len(payload.len(), max_payload)?;

    match framing {
        Framing::Lines => {
            writer.write_all(payload).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::Packet4 => {
            let len = u32::try_from(payload.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "payload exceeds u32"))?;
            writer.write_all(&len.to_be_bytes()).await?;
            writer.write_all(payload).await?;
        }
    }
    Ok(())
}

fn check_len(len: usize, max_payload: usize) -> io::Result<()> {
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} > {max_payload}"),
        ));
    }
    Ok(())
}

fn json_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
