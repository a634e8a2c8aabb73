//! Length-prefixed TCP framing (`FixedSizeHeader` + payload) for the two things that don't fit in
//! a UDP datagram: batched recovery and client-value ingest.

use buffertk::{stack_pack, Unpackable};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use ringpaxos_pb::{BatchRecoveryRequest, BatchRecoveryReply, Error, FixedSizeHeader, ValueData};

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, Error> {
    let mut header_buf = [0u8; FixedSizeHeader::ENCODED_LEN];
    reader.read_exact(&mut header_buf).await?;
    let header = FixedSizeHeader::from_bytes(header_buf);
    let mut body = vec![0u8; header.size as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<(), Error> {
    let header = FixedSizeHeader::new(body.len() as u32);
    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(body).await?;
    Ok(())
}

fn deserialization_error<E: std::fmt::Debug>(e: E) -> Error {
    Error::SerializationError {
        core: Default::default(),
        what: format!("{e:?}"),
    }
}

pub async fn write_batch_recovery_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: BatchRecoveryRequest,
) -> Result<(), Error> {
    write_frame(writer, &stack_pack(request).to_vec()).await
}

pub async fn read_batch_recovery_request<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<BatchRecoveryRequest, Error> {
    let body = read_frame(reader).await?;
    Ok(BatchRecoveryRequest::unpack(&body).map_err(deserialization_error)?.0)
}

pub async fn write_batch_recovery_reply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    reply: BatchRecoveryReply,
) -> Result<(), Error> {
    write_frame(writer, &stack_pack(reply).to_vec()).await
}

pub async fn read_batch_recovery_reply<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<BatchRecoveryReply, Error> {
    let body = read_frame(reader).await?;
    Ok(BatchRecoveryReply::unpack(&body).map_err(deserialization_error)?.0)
}

pub async fn write_value_data<W: AsyncWrite + Unpin>(writer: &mut W, value: ValueData) -> Result<(), Error> {
    write_frame(writer, &stack_pack(value).to_vec()).await
}

pub async fn read_value_data<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ValueData, Error> {
    let body = read_frame(reader).await?;
    Ok(ValueData::unpack(&body).map_err(deserialization_error)?.0)
}
