mod responder;

pub use responder::{ChatEvent, Reply, ResponseHandler, UserTurn};
