//! Response encoder.
//!
//! Success response frames:
//!
//! ```text
//! [instance blob][is ddl: int 0|1][schema string]
//! ```
//!
//! The whole response is encoded before anything is written, so a failure
//! while serializing leaves no partial success frames on the connection.

use bytes::BytesMut;

use crate::error::Result;
use crate::protocol::{put_blob, put_int, put_str};
use crate::resolver::ResolvedSource;

/// Encode the success response for a resolved source.
pub fn encode_response(resolved: &ResolvedSource) -> Result<BytesMut> {
    let instance = resolved.instance.encode()?;
    let schema = resolved.schema.to_wire_text()?;

    let mut buf = BytesMut::with_capacity(instance.len() + schema.len() + 12);
    put_blob(&mut buf, &instance)?;
    put_int(&mut buf, i32::from(resolved.schema.is_ddl()));
    put_str(&mut buf, &schema)?;
    Ok(buf)
}
