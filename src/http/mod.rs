//! HTTP wire engine: message boundary, parsers and the socket transport

pub mod message;
pub mod parse;
pub mod transport;

pub use message::{Body, HttpMessage};
pub use parse::{
    decode_chunked, encode_chunked, parse_chunk_size, parse_header_block, parse_response_head,
    parse_status_line, split_label_value, ParseMode, ResponseHead, StatusLine,
};
pub use transport::{Expr, HeadersHook, HttpTransport, WireResponse, MAX_HEADER_LINE};
