use vio::error::{Error, Location, State, Subject};

pub fn net_err(subject: Subject, state: State) -> Error {
    Error {
        location: Location::Network,
        subject,
        state,
    }
}

pub fn closed_err(subject: Subject) -> Error {
    net_err(subject, State::BrokenPipe)
}
