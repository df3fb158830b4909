pub mod calls;
mod decoder;

pub use calls::Call;
pub use calls::CallDecodeError;
pub use calls::Wrapper;
pub use decoder::flatten_extrinsic;
pub use decoder::BlockData;
pub use decoder::BlockDecoder;
