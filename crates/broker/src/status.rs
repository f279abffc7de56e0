use evalbridge_protocol::{DaemonInfo, StatusResponse};

use crate::directory::ClientDirectory;

/// Builds a status answer from the directory as it is right now.
pub fn report(request_id: String, process_id: u32, directory: &ClientDirectory) -> StatusResponse {
	StatusResponse {
		id: request_id,
		daemon: DaemonInfo {
			pid: Some(process_id),
			listening: true,
		},
		clients: directory.clients(),
	}
}
