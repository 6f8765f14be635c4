pub mod request_dispatcher;

pub use request_dispatcher::RequestDispatcher;
