//! Message codes of the render protocol.
//!
//! Client request codes occupy 0-35 plus the 256-299 configuration range;
//! server reply codes are a separate enum. The engine only drives a handful
//! of these, but the session layer must be able to name any code it reads.

/// Requests a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ClientMessage {
    Goodbye = 0,
    GetImage = 1,
    GetElevation = 2,
    GetElevations = 3,
    LookupPoint = 4,
    LookupPoints = 5,
    GetPoint = 6,
    GetPoints = 7,
    Echo = 8,
    GetRangeImage = 9,
    GetRangeTexture = 10,
    GetViewpointByDegreesS = 11,
    GetViewpointByQuaternionS = 12,
    GetLidarPulseResult = 13,
    GetLidarMeasurement = 14,
    GetRadarResponse = 15,
    GetViewpointByDegreesD = 16,
    GetViewpointByQuaternionD = 17,
    GetJoints = 18,
    GetJointConfig = 19,
    GetFrames = 20,
    GetFrame = 21,
    GetFrameAsRadians = 22,
    GetSurfaceElevation = 23,
    GetSurfaceElevations = 24,
    GetSurfacePatch = 25,
    GetViewpointByRadians = 26,
    Quit = 27,
    GetViewpointByFrame = 28,
    GetCameraProperties = 29,
    GetViewpointByCamera = 30,
    GetViewAsDem = 31,
    GetLidarMeasurementD = 32,
    GetTimeTag = 33,
    GetLidarMeasurementS = 34,
    GetLidarSnapshot = 35,
    SetViewpointByDegreesS = 256,
    SetViewpointByQuaternionS = 257,
    SetAmbientLight = 258,
    SetSunColour = 259,
    SetSkyType = 260,
    SetFieldOfViewByDegrees = 261,
    SetAspectRatio = 262,
    SetBoulderView = 263,
    SetSurfaceView = 264,
    SetLidarParameters = 265,
    SetCornerCubesS = 266,
    SetCornerCubeAttitude = 267,
    SetViewpointByDegreesD = 268,
    SetViewpointByQuaternionD = 269,
    SetObjectPositionAttitude = 270,
    SetSunByDegrees = 271,
    SetJointConfig = 272,
    SetStarQuaternion = 273,
    SetStarMagnitudes = 274,
    SetSecondaryByDegrees = 275,
    SetGlobalTime = 276,
    SetObjectView = 277,
    SetViewpointByRadians = 278,
    SetFieldOfViewByRadians = 279,
    SetSunByRadians = 280,
    SetSecondaryByRadians = 281,
    SetSkyRgb = 282,
    SetSkyCie = 283,
    SetAtmosphereTau = 284,
    SetGlobalFogMode = 285,
    SetGlobalFogProperties = 286,
    SetAtmosphereMode = 287,
    SelectCamera = 288,
    BindLightToCamera = 289,
    ConfigureLightByDegrees = 290,
    ConfigureLightByRadians = 291,
    SetLightPositionDirection = 292,
    RenderToHoldBuffer = 293,
    DisplayHoldBuffer = 294,
    SetCornerCubesD = 295,
    SetProjectionMode = 296,
    SetOrthoFieldOfView = 297,
    SetLidarScan = 298,
    SetCameraMotion = 299,
}

impl ClientMessage {
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Replies a server may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ServerMessage {
    Okay = 0,
    Error = 1,
    Image = 2,
    Float = 3,
    FloatArray = 4,
    Point3d = 5,
    Point3dArray = 6,
    MemoryBlock = 7,
    EchoReply = 8,
    LidarPulseResult = 9,
    LidarMeasurement = 10,
    RadarResponse = 11,
    Double = 12,
    DoubleArray = 13,
    JointList = 14,
    FrameList = 15,
    CameraProperties = 16,
    RawImage = 17,
}

impl ServerMessage {
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Map a wire code back to the enum, if it names a known reply.
    pub fn from_code(code: u32) -> Option<Self> {
        use ServerMessage::*;
        Some(match code {
            0 => Okay,
            1 => Error,
            2 => Image,
            3 => Float,
            4 => FloatArray,
            5 => Point3d,
            6 => Point3dArray,
            7 => MemoryBlock,
            8 => EchoReply,
            9 => LidarPulseResult,
            10 => LidarMeasurement,
            11 => RadarResponse,
            12 => Double,
            13 => DoubleArray,
            14 => JointList,
            15 => FrameList,
            16 => CameraProperties,
            17 => RawImage,
            _ => return None,
        })
    }
}
