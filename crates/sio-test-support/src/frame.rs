/// The wire carries the same two-variant shape on both sides, but
/// `sio_server::Frame` and `sio_client::Frame` are distinct types (neither
/// crate depends on the other) — these convert between them at the mock
/// transport boundary.
pub fn to_client_frame(frame: sio_server::Frame) -> sio_client::Frame {
    match frame {
        sio_server::Frame::Text(text) => sio_client::Frame::Text(text),
        sio_server::Frame::Binary(bytes) => sio_client::Frame::Binary(bytes),
    }
}

pub fn to_server_frame(frame: sio_client::Frame) -> sio_server::Frame {
    match frame {
        sio_client::Frame::Text(text) => sio_server::Frame::Text(text),
        sio_client::Frame::Binary(bytes) => sio_server::Frame::Binary(bytes),
    }
}
