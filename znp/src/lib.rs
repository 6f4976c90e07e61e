//host side of the znp (z-stack network processor) application framework layer

pub mod af;
pub mod config;
pub mod correlator;
pub mod error;
pub mod mt;
pub mod sequencer;
pub mod session;
pub mod status;
pub mod transport;

pub use error::{ Error, CommandError, Outcome };
pub use session::AfSession;
pub use config::SessionConfig;
pub use correlator::{ Notify, RequestId };
pub use af::{ EndpointDescriptor, IncomingMessage };
pub use transport::{ Transport, StreamTransport };
pub use status::ZStatus;
