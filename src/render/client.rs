//! Render-server session: handshake, typed requests, classified failures.
//!
//! The client is generic over its transport so the session logic can be
//! exercised against scripted in-memory streams; production code uses
//! `RenderClient<TcpStream>` via [`RenderClient::connect`].

use std::io::{Read, Write};
use std::net::TcpStream;

use thiserror::Error;
use tracing::debug;

use crate::flight::Pose;
use crate::render::codec;
use crate::render::messages::{ClientMessage, ServerMessage};

/// Protocol version word sent at session start (protocol 1.20).
pub const PROTOCOL_VERSION: u32 = 0x0000_0114;

/// Classified failure at the protocol boundary.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("render session i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("server reported error {code}: {message}")]
    Server { code: i32, message: String },
    #[error("received message code {got} when expecting message code {expected}")]
    Unexpected { got: u32, expected: u32 },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Static camera description returned by `GetCameraProperties`.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraProperties {
    pub width: u32,
    pub height: u32,
    /// Horizontal field of view, radians.
    pub h_fov: f64,
    /// Vertical field of view, radians.
    pub v_fov: f64,
    pub position: [f64; 3],
    /// Attitude quaternion, scalar term first.
    pub attitude: [f64; 4],
}

/// One protocol session with the render server.
pub struct RenderClient<S> {
    stream: S,
}

impl RenderClient<TcpStream> {
    /// Open a TCP connection and perform the version handshake.
    pub fn connect(host: &str, port: u16) -> SessionResult<Self> {
        let stream = TcpStream::connect((host, port))?;
        let mut client = RenderClient::new(stream);
        client.start()?;
        Ok(client)
    }
}

impl<S: Read + Write> RenderClient<S> {
    /// Wrap an already-connected transport. The handshake is not performed;
    /// call [`RenderClient::start`] before issuing requests.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Begin the session: send the protocol version, expect OKAY.
    pub fn start(&mut self) -> SessionResult<()> {
        codec::write_u32(&mut self.stream, PROTOCOL_VERSION)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Okay)
    }

    /// End the session with GOODBYE. The server sends no reply and will
    /// normally close the connection afterwards.
    pub fn finish(&mut self) -> SessionResult<()> {
        codec::write_u32(&mut self.stream, ClientMessage::Goodbye.code())?;
        self.stream.flush()?;
        Ok(())
    }

    /// Ask the server process itself to shut down.
    pub fn quit(&mut self) -> SessionResult<()> {
        codec::write_u32(&mut self.stream, ClientMessage::Quit.code())?;
        self.stream.flush()?;
        self.expect(ServerMessage::Okay)
    }

    /// Request one rendered image at the current camera settings. The body
    /// is returned verbatim, textual preamble included.
    pub fn get_image(&mut self) -> SessionResult<Vec<u8>> {
        codec::write_u32(&mut self.stream, ClientMessage::GetImage.code())?;
        self.stream.flush()?;
        self.expect(ServerMessage::Image)?;
        self.read_sized_body()
    }

    /// Move the camera and render in one round trip. Angles in degrees.
    pub fn get_viewpoint_by_degrees(&mut self, pose: &Pose) -> SessionResult<Vec<u8>> {
        let mut request = Vec::with_capacity(4 + 6 * 8);
        codec::write_u32(&mut request, ClientMessage::GetViewpointByDegreesD.code())?;
        for v in [pose.x, pose.y, pose.z, pose.yaw, pose.pitch, pose.roll] {
            codec::write_f64(&mut request, v)?;
        }
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Image)?;
        self.read_sized_body()
    }

    /// Render from the named camera without changing the current one. An
    /// unknown camera yields an empty image.
    pub fn get_viewpoint_by_camera(&mut self, camera_id: u32) -> SessionResult<Vec<u8>> {
        let mut request = Vec::with_capacity(8);
        codec::write_u32(&mut request, ClientMessage::GetViewpointByCamera.code())?;
        codec::write_u32(&mut request, camera_id)?;
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Image)?;
        self.read_sized_body()
    }

    /// Elevation of the camera above the model, or `None` when the camera
    /// is not over any part of it.
    pub fn get_elevation(&mut self) -> SessionResult<Option<f32>> {
        codec::write_u32(&mut self.stream, ClientMessage::GetElevation.code())?;
        self.stream.flush()?;
        self.expect(ServerMessage::Float)?;
        let value = codec::read_f32(&mut self.stream)?;
        let valid = codec::read_bool(&mut self.stream)?;
        Ok(valid.then_some(value))
    }

    /// 3D model position under the image pixel at normalized coordinates
    /// (x, y), with (0, 0) the bottom-left corner and (1, 1) the top-right.
    /// `None` when the pixel does not cover the model.
    pub fn lookup_point(&mut self, x: f32, y: f32) -> SessionResult<Option<[f32; 3]>> {
        let mut request = Vec::with_capacity(4 + 2 * 4);
        codec::write_u32(&mut request, ClientMessage::LookupPoint.code())?;
        codec::write_f32(&mut request, x)?;
        codec::write_f32(&mut request, y)?;
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Point3d)?;
        let mut point = [0.0f32; 3];
        for p in &mut point {
            *p = codec::read_f32(&mut self.stream)?;
        }
        let valid = codec::read_bool(&mut self.stream)?;
        Ok(valid.then_some(point))
    }

    /// Time the last image was requested at, in microseconds since the Unix
    /// epoch; `None` when the server has no tag yet.
    pub fn get_time_tag(&mut self) -> SessionResult<Option<f64>> {
        codec::write_u32(&mut self.stream, ClientMessage::GetTimeTag.code())?;
        self.stream.flush()?;
        self.expect(ServerMessage::Double)?;
        let value = codec::read_f64(&mut self.stream)?;
        let valid = codec::read_bool(&mut self.stream)?;
        Ok(valid.then_some(value))
    }

    /// Round-trip an opaque byte block through the server.
    pub fn echo(&mut self, payload: &[u8]) -> SessionResult<Vec<u8>> {
        let mut request = Vec::with_capacity(8 + payload.len());
        codec::write_u32(&mut request, ClientMessage::Echo.code())?;
        codec::write_u32(&mut request, payload.len() as u32)?;
        request.extend_from_slice(payload);
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::EchoReply)?;
        self.read_sized_body()
    }

    /// Make `camera_id` the current camera for image and lookup requests.
    pub fn select_camera(&mut self, camera_id: u32) -> SessionResult<()> {
        self.configure_u32(ClientMessage::SelectCamera, camera_id)
    }

    /// Sky rendering mode for subsequent renders.
    pub fn set_sky_type(&mut self, sky_type: u32) -> SessionResult<()> {
        self.configure_u32(ClientMessage::SetSkyType, sky_type)
    }

    /// Angular field-of-view width in degrees; the height follows from the
    /// aspect ratio.
    pub fn set_field_of_view_by_degrees(&mut self, degrees: f32) -> SessionResult<()> {
        self.configure_f32(ClientMessage::SetFieldOfViewByDegrees, degrees)
    }

    /// Pixel aspect ratio.
    pub fn set_aspect_ratio(&mut self, ratio: f32) -> SessionResult<()> {
        self.configure_f32(ClientMessage::SetAspectRatio, ratio)
    }

    /// Ambient light colour.
    pub fn set_ambient_light(&mut self, r: f32, g: f32, b: f32) -> SessionResult<()> {
        let mut request = Vec::with_capacity(4 + 3 * 4);
        codec::write_u32(&mut request, ClientMessage::SetAmbientLight.code())?;
        for v in [r, g, b] {
            codec::write_f32(&mut request, v)?;
        }
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Okay)
    }

    /// Spherical polar position of the sun, degrees.
    pub fn set_sun_by_degrees(
        &mut self,
        range: f64,
        azimuth: f64,
        elevation: f64,
    ) -> SessionResult<()> {
        let mut request = Vec::with_capacity(4 + 3 * 8);
        codec::write_u32(&mut request, ClientMessage::SetSunByDegrees.code())?;
        for v in [range, azimuth, elevation] {
            codec::write_f64(&mut request, v)?;
        }
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Okay)
    }

    /// Global animation time, seconds.
    pub fn set_global_time(&mut self, time: f64) -> SessionResult<()> {
        let mut request = Vec::with_capacity(4 + 8);
        codec::write_u32(&mut request, ClientMessage::SetGlobalTime.code())?;
        codec::write_f64(&mut request, time)?;
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Okay)
    }

    /// Set the camera pose from a position and attitude quaternion
    /// (scalar term first).
    pub fn set_viewpoint_by_quaternion(
        &mut self,
        position: [f64; 3],
        attitude: [f64; 4],
    ) -> SessionResult<()> {
        let mut request = Vec::with_capacity(4 + 7 * 8);
        codec::write_u32(&mut request, ClientMessage::SetViewpointByQuaternionD.code())?;
        for v in position.into_iter().chain(attitude) {
            codec::write_f64(&mut request, v)?;
        }
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Okay)
    }

    /// Query camera properties. Returns `None` when the server signals an
    /// invalid camera id with a zero-length reply.
    pub fn get_camera_properties(
        &mut self,
        camera_id: u32,
    ) -> SessionResult<Option<CameraProperties>> {
        let mut request = Vec::with_capacity(8);
        codec::write_u32(&mut request, ClientMessage::GetCameraProperties.code())?;
        codec::write_u32(&mut request, camera_id)?;
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::CameraProperties)?;

        let len = codec::read_u32(&mut self.stream)? as usize;
        if len == 0 {
            return Ok(None);
        }

        // Fixed reply layout: two u32s, then nine doubles. Surplus bytes
        // from a newer server are read and discarded; a short reply leaves
        // the tail fields zeroed.
        const REPLY_LEN: usize = 2 * 4 + 9 * 8;
        let mut body = [0u8; REPLY_LEN];
        let take = len.min(REPLY_LEN);
        self.stream.read_exact(&mut body[..take])?;
        for _ in take..len {
            codec::read_u8(&mut self.stream)?;
        }

        let mut cursor = &body[..];
        let width = codec::read_u32(&mut cursor)?;
        let height = codec::read_u32(&mut cursor)?;
        let h_fov = codec::read_f64(&mut cursor)?;
        let v_fov = codec::read_f64(&mut cursor)?;
        let mut position = [0.0; 3];
        for p in &mut position {
            *p = codec::read_f64(&mut cursor)?;
        }
        let mut attitude = [0.0; 4];
        for q in &mut attitude {
            *q = codec::read_f64(&mut cursor)?;
        }
        Ok(Some(CameraProperties {
            width,
            height,
            h_fov,
            v_fov,
            position,
            attitude,
        }))
    }

    /// Set the camera pose for subsequent renders. Angles in degrees.
    pub fn set_viewpoint_by_degrees(&mut self, pose: &Pose) -> SessionResult<()> {
        let mut request = Vec::with_capacity(4 + 6 * 8);
        codec::write_u32(&mut request, ClientMessage::SetViewpointByDegreesD.code())?;
        for v in [pose.x, pose.y, pose.z, pose.yaw, pose.pitch, pose.roll] {
            codec::write_f64(&mut request, v)?;
        }
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Okay)
    }

    /// Read a `u32` length followed by that many opaque bytes.
    fn read_sized_body(&mut self) -> SessionResult<Vec<u8>> {
        let size = codec::read_u32(&mut self.stream)? as usize;
        let mut data = vec![0u8; size];
        self.stream.read_exact(&mut data)?;
        debug!(bytes = size, "received sized reply body");
        Ok(data)
    }

    /// Configuration setter carrying one `u32`, acknowledged with OKAY.
    fn configure_u32(&mut self, message: ClientMessage, value: u32) -> SessionResult<()> {
        let mut request = Vec::with_capacity(8);
        codec::write_u32(&mut request, message.code())?;
        codec::write_u32(&mut request, value)?;
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Okay)
    }

    /// Configuration setter carrying one `f32`, acknowledged with OKAY.
    fn configure_f32(&mut self, message: ClientMessage, value: f32) -> SessionResult<()> {
        let mut request = Vec::with_capacity(8);
        codec::write_u32(&mut request, message.code())?;
        codec::write_f32(&mut request, value)?;
        self.stream.write_all(&request)?;
        self.stream.flush()?;
        self.expect(ServerMessage::Okay)
    }

    /// Read the next reply code and check it against the expectation. An
    /// ERROR reply is decoded into a classified failure; any other mismatch
    /// names both codes.
    fn expect(&mut self, want: ServerMessage) -> SessionResult<()> {
        let got = codec::read_u32(&mut self.stream)?;
        if got == want.code() {
            return Ok(());
        }
        if got == ServerMessage::Error.code() {
            let code = codec::read_i32(&mut self.stream)?;
            let message = codec::read_string(&mut self.stream)?;
            return Err(SessionError::Server { code, message });
        }
        Err(SessionError::Unexpected {
            got,
            expected: want.code(),
        })
    }
}
