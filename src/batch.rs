//! Request batching.
//!
//! Splits a [`ReadOperandsRequest`] into the protocol messages a controller
//! with a given receive buffer can answer.
//!
//! - Protocol A reads one contiguous range of a single kind per message.
//!   Ranges may span unrequested addresses, which are read and discarded.
//! - Protocol B packs several kinds into one message, one block per kind, as
//!   long as both the request and the anticipated response fit the buffer.
//!
//! Both planners are greedy and single-pass. The same input always yields
//! the same messages in the same order.

use tracing::trace;

use crate::error::{PcomError, Result};
use crate::header::Protocol;
use crate::operand::{OperandKind, ReadOperandsRequest};
use crate::pcom_a::{AsciiReadRequest, MAX_READ_COUNT, RESPONSE_OVERHEAD};
use crate::pcom_b::{
    request_payload_len, response_budget_len, BinaryReadRequest, ReadBlock, FRAME_OVERHEAD,
    MAX_BLOCK_ADDRESSES, MAX_VECTORIAL_COUNT,
};

/// Plans Protocol A reads for `request`.
///
/// # Errors
///
/// Returns `UnsupportedOperand` for a kind without a read command, or
/// `BufferTooSmall` if a single value does not fit the buffer.
pub fn plan_ascii_reads(
    request: &ReadOperandsRequest,
    buffer_size: usize,
) -> Result<Vec<AsciiReadRequest>> {
    let payload_budget = buffer_size.saturating_sub(RESPONSE_OVERHEAD);
    let mut reads = Vec::new();

    for (kind, addresses) in request.operands() {
        let kind = *kind;
        if kind.ascii_read_command().is_none() {
            return Err(PcomError::UnsupportedOperand {
                kind,
                operation: "read",
                protocol: Protocol::PcomA,
            });
        }

        let max_count = (payload_budget / kind.ascii_width()).min(MAX_READ_COUNT);
        if max_count == 0 {
            return Err(PcomError::BufferTooSmall {
                buffer_size,
                protocol: Protocol::PcomA,
            });
        }

        let mut range: Option<(u16, u16)> = None;
        for &address in addresses {
            range = match range {
                Some((start, _)) if usize::from(address - start) < max_count => {
                    Some((start, address))
                }
                Some((start, last)) => {
                    reads.push(AsciiReadRequest::new(kind, start, last - start + 1)?);
                    Some((address, address))
                }
                None => Some((address, address)),
            };
        }
        if let Some((start, last)) = range {
            reads.push(AsciiReadRequest::new(kind, start, last - start + 1)?);
        }
    }

    trace!(
        operands = request.len(),
        messages = reads.len(),
        "planned PCOM-A reads"
    );
    Ok(reads)
}

/// Smallest buffer that can carry one binary read block.
pub const MIN_BINARY_BUFFER: usize = FRAME_OVERHEAD + 4 + 6;

/// Accumulates blocks for one binary message.
struct MessagePlan {
    blocks: Vec<ReadBlock>,
    budget: usize,
}

impl MessagePlan {
    fn new(budget: usize) -> Self {
        Self {
            blocks: Vec::new(),
            budget,
        }
    }

    fn fits(&self) -> bool {
        request_payload_len(&self.blocks) <= self.budget
            && response_budget_len(&self.blocks) <= self.budget
    }

    /// Adds `address` of `kind`, keeping the plan within budget.
    ///
    /// Returns `false`, leaving the plan unchanged, when it does not fit.
    fn try_add(&mut self, kind: OperandKind, address: u16) -> bool {
        match self.blocks.last_mut() {
            Some(ReadBlock::Vectorial {
                kind: block_kind,
                start,
                count,
            }) if *block_kind == kind => {
                let needed = u32::from(address) - u32::from(*start) + 1;
                if needed <= u32::from(*count) {
                    return true;
                }
                let extended = needed.div_ceil(8) * 8;
                if extended > u32::from(MAX_VECTORIAL_COUNT) {
                    return false;
                }
                let previous = *count;
                *count = extended as u16;
                if self.fits() {
                    return true;
                }
                if let Some(ReadBlock::Vectorial { count, .. }) = self.blocks.last_mut() {
                    *count = previous;
                }
                false
            }
            Some(ReadBlock::NonVectorial {
                kind: block_kind,
                addresses,
            }) if *block_kind == kind => {
                if addresses.len() >= MAX_BLOCK_ADDRESSES {
                    return false;
                }
                addresses.push(address);
                if self.fits() {
                    return true;
                }
                if let Some(ReadBlock::NonVectorial { addresses, .. }) = self.blocks.last_mut() {
                    addresses.pop();
                }
                false
            }
            _ => {
                let block = if kind.is_bit() {
                    ReadBlock::Vectorial {
                        kind,
                        start: address,
                        count: 8,
                    }
                } else {
                    ReadBlock::NonVectorial {
                        kind,
                        addresses: vec![address],
                    }
                };
                self.blocks.push(block);
                if self.fits() {
                    return true;
                }
                self.blocks.pop();
                false
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.blocks.iter().all(|block| block.count() == 0)
    }
}

/// Plans Protocol B reads for `request`.
///
/// Kinds are visited in type-code order and addresses in ascending order.
/// Each address joins the current message if both payloads stay within
/// `buffer_size` and its block stays within 255 addresses; otherwise the
/// message is sealed and a new one starts with that address.
///
/// # Errors
///
/// Returns `UnsupportedOperand` for a kind without a binary read code, or
/// `BufferTooSmall` below [`MIN_BINARY_BUFFER`].
pub fn plan_binary_reads(
    request: &ReadOperandsRequest,
    buffer_size: usize,
) -> Result<Vec<BinaryReadRequest>> {
    if buffer_size < MIN_BINARY_BUFFER {
        return Err(PcomError::BufferTooSmall {
            buffer_size,
            protocol: Protocol::PcomB,
        });
    }
    let budget = buffer_size - FRAME_OVERHEAD;

    let mut kinds = Vec::with_capacity(request.operands().len());
    for (kind, addresses) in request.operands() {
        let code = kind.binary_read_code().ok_or(PcomError::UnsupportedOperand {
            kind: *kind,
            operation: "read",
            protocol: Protocol::PcomB,
        })?;
        kinds.push((code, *kind, addresses));
    }
    kinds.sort_by_key(|(code, _, _)| *code);

    let mut sealed = Vec::new();
    let mut current = MessagePlan::new(budget);

    for (_, kind, addresses) in kinds {
        for &address in addresses {
            if current.try_add(kind, address) {
                continue;
            }
            sealed.push(std::mem::replace(&mut current, MessagePlan::new(budget)));
            if !current.try_add(kind, address) {
                // an empty plan always holds one block above MIN_BINARY_BUFFER
                return Err(PcomError::BufferTooSmall {
                    buffer_size,
                    protocol: Protocol::PcomB,
                });
            }
        }
    }
    sealed.push(current);

    let messages = sealed
        .into_iter()
        .filter(|plan| !plan.is_empty())
        .map(|plan| BinaryReadRequest::new(plan.blocks))
        .collect::<Result<Vec<_>>>()?;

    trace!(
        operands = request.len(),
        messages = messages.len(),
        "planned PCOM-B reads"
    );
    Ok(messages)
}
