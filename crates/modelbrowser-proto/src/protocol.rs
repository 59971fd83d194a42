//! Wire codec for the `modelbrowser:main` channel.
//!
//! Every frame is a big-endian `u32` payload length followed by the payload.
//! A payload starts with the opcode string and continues with the fields that
//! opcode defines, in order:
//!
//! ```text
//!  string  = u16 byte length (BE) + UTF-8 bytes
//!  int32   = 4 bytes BE, two's complement
//!  int64   = 8 bytes BE, two's complement
//!  bool    = int32, 0 or 1
//!  list    = int32 count + count × element
//! ```
//!
//! There is no request id: the order of frames on one connection is the only
//! correlation between a request and its answer.

use thiserror::Error;

/// Logical channel name advertised to companion clients.
pub const CHANNEL: &str = "modelbrowser:main";

/// Frames whose declared payload exceeds this are never buffered.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Not enough bytes buffered for a whole frame yet.
    #[error("incomplete frame")]
    Incomplete,
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
    #[error("payload truncated: {needed} more bytes needed")]
    Truncated { needed: usize },
    #[error("unknown opcode: {0:?}")]
    UnknownOpcode(String),
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("string of {0} bytes does not fit a u16 length prefix")]
    StringTooLong(usize),
    #[error("list of {0} elements does not fit an int32 count")]
    CountOverflow(usize),
    #[error("negative count: {0}")]
    NegativeCount(i32),
    #[error("unknown interaction kind: {0}")]
    UnknownInteraction(i32),
    #[error("unknown error reason: {0:?}")]
    UnknownReason(String),
    #[error("{extra} trailing bytes after {opcode}")]
    TrailingBytes { opcode: &'static str, extra: usize },
}

// ── Opcodes ───────────────────────────────────────────────────────────────────

/// Closed set of frame tags. The opcode alone determines the field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // client -> daemon
    Hello,
    Ping,
    RequestModels,
    RequestModel,
    UploadModel,
    DeleteModel,
    SearchModels,
    GetCategories,
    GetModelsByCategory,
    GetModelInfo,
    Reload,
    BrowserOpen,
    BrowserClick,
    BrowserClose,
    HoldItem,
    Command,
    // daemon -> client
    ModelList,
    ModelData,
    UploadResponse,
    DeleteResponse,
    SearchResults,
    Categories,
    CategoryModels,
    ModelInfo,
    OpenBrowser,
    BrowserPage,
    BrowserClosed,
    ItemApplied,
    ItemGiven,
    ModelSummary,
    Notification,
    Pong,
    Error,
}

impl Opcode {
    pub const ALL: [Opcode; 33] = [
        Opcode::Hello,
        Opcode::Ping,
        Opcode::RequestModels,
        Opcode::RequestModel,
        Opcode::UploadModel,
        Opcode::DeleteModel,
        Opcode::SearchModels,
        Opcode::GetCategories,
        Opcode::GetModelsByCategory,
        Opcode::GetModelInfo,
        Opcode::Reload,
        Opcode::BrowserOpen,
        Opcode::BrowserClick,
        Opcode::BrowserClose,
        Opcode::HoldItem,
        Opcode::Command,
        Opcode::ModelList,
        Opcode::ModelData,
        Opcode::UploadResponse,
        Opcode::DeleteResponse,
        Opcode::SearchResults,
        Opcode::Categories,
        Opcode::CategoryModels,
        Opcode::ModelInfo,
        Opcode::OpenBrowser,
        Opcode::BrowserPage,
        Opcode::BrowserClosed,
        Opcode::ItemApplied,
        Opcode::ItemGiven,
        Opcode::ModelSummary,
        Opcode::Notification,
        Opcode::Pong,
        Opcode::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Hello => "hello",
            Opcode::Ping => "ping",
            Opcode::RequestModels => "request_models",
            Opcode::RequestModel => "request_model",
            Opcode::UploadModel => "upload_model",
            Opcode::DeleteModel => "delete_model",
            Opcode::SearchModels => "search_models",
            Opcode::GetCategories => "get_categories",
            Opcode::GetModelsByCategory => "get_models_by_category",
            Opcode::GetModelInfo => "get_model_info",
            Opcode::Reload => "reload",
            Opcode::BrowserOpen => "browser_open",
            Opcode::BrowserClick => "browser_click",
            Opcode::BrowserClose => "browser_close",
            Opcode::HoldItem => "hold_item",
            Opcode::Command => "command",
            Opcode::ModelList => "model_list",
            Opcode::ModelData => "model_data",
            Opcode::UploadResponse => "upload_response",
            Opcode::DeleteResponse => "delete_response",
            Opcode::SearchResults => "search_results",
            Opcode::Categories => "categories",
            Opcode::CategoryModels => "category_models",
            Opcode::ModelInfo => "model_info",
            Opcode::OpenBrowser => "open_browser",
            Opcode::BrowserPage => "browser_page",
            Opcode::BrowserClosed => "browser_closed",
            Opcode::ItemApplied => "item_applied",
            Opcode::ItemGiven => "item_given",
            Opcode::ModelSummary => "model_summary",
            Opcode::Notification => "notification",
            Opcode::Pong => "pong",
            Opcode::Error => "error",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == tag)
    }

    /// True for opcodes a client sends to the daemon.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Opcode::Hello
                | Opcode::Ping
                | Opcode::RequestModels
                | Opcode::RequestModel
                | Opcode::UploadModel
                | Opcode::DeleteModel
                | Opcode::SearchModels
                | Opcode::GetCategories
                | Opcode::GetModelsByCategory
                | Opcode::GetModelInfo
                | Opcode::Reload
                | Opcode::BrowserOpen
                | Opcode::BrowserClick
                | Opcode::BrowserClose
                | Opcode::HoldItem
                | Opcode::Command
        )
    }
}

/// Reason codes carried by the `error` opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    NoPermission,
    InvalidJson,
    ModelNotFound,
    TooLarge,
    InvalidName,
    AlreadyExists,
}

impl ErrorReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorReason::NoPermission => "no_permission",
            ErrorReason::InvalidJson => "invalid_json",
            ErrorReason::ModelNotFound => "model_not_found",
            ErrorReason::TooLarge => "too_large",
            ErrorReason::InvalidName => "invalid_name",
            ErrorReason::AlreadyExists => "already_exists",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        [
            ErrorReason::NoPermission,
            ErrorReason::InvalidJson,
            ErrorReason::ModelNotFound,
            ErrorReason::TooLarge,
            ErrorReason::InvalidName,
            ErrorReason::AlreadyExists,
        ]
        .into_iter()
        .find(|r| r.as_str() == code)
    }
}

/// How a viewer interacted with a surface slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Primary,
    Secondary,
    Shift,
    Middle,
    Drop,
    DoubleClick,
    NumberKey,
}

impl InteractionKind {
    pub fn code(self) -> i32 {
        match self {
            InteractionKind::Primary => 0,
            InteractionKind::Secondary => 1,
            InteractionKind::Shift => 2,
            InteractionKind::Middle => 3,
            InteractionKind::Drop => 4,
            InteractionKind::DoubleClick => 5,
            InteractionKind::NumberKey => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(InteractionKind::Primary),
            1 => Some(InteractionKind::Secondary),
            2 => Some(InteractionKind::Shift),
            3 => Some(InteractionKind::Middle),
            4 => Some(InteractionKind::Drop),
            5 => Some(InteractionKind::DoubleClick),
            6 => Some(InteractionKind::NumberKey),
            _ => None,
        }
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Frames sent from a companion client to the daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Binds the connection to a viewer identity. Must come first.
    Hello { viewer: String },
    Ping,
    RequestModels,
    /// Raw JSON source of one entry.
    RequestModel { id: String },
    UploadModel { id: String, json: String, overwrite: bool },
    DeleteModel { id: String },
    SearchModels { query: String },
    GetCategories,
    GetModelsByCategory { category: String },
    GetModelInfo { id: String },
    Reload,
    /// Empty `query`/`category` means no filter on that axis.
    BrowserOpen { query: String, category: String },
    BrowserClick { surface: i64, slot: i32, kind: InteractionKind },
    BrowserClose,
    /// Empty material means an empty hand.
    HoldItem { material: String },
    /// One textual command line, e.g. `search sword`.
    Command { line: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryGroup {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBinding {
    pub slot: i32,
    pub id: String,
}

/// Frames sent from the daemon to a companion client.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ModelList { models: Vec<String> },
    ModelData { id: String, json: String },
    UploadResponse { id: String, created: bool },
    DeleteResponse { id: String, deleted: bool },
    SearchResults { query: String, results: Vec<String> },
    Categories { groups: Vec<CategoryGroup> },
    CategoryModels { category: String, models: Vec<String> },
    ModelInfo { id: String, size: i64, category: String, last_modified: i64 },
    OpenBrowser,
    /// Mirror of a session's current page: which entry sits in which slot.
    BrowserPage { surface: i64, page: i32, total_pages: i32, slots: Vec<SlotBinding> },
    BrowserClosed { surface: i64 },
    ItemApplied { id: String, display_name: String },
    /// `custom_model_data` is 0 when no numeric tag is assigned.
    ItemGiven { id: String, material: String, display_name: String, custom_model_data: i32 },
    ModelSummary { id: String, material: String, custom_model_data: i32 },
    Notification { message: String },
    Pong,
    Error { reason: ErrorReason, detail: String },
}

impl Event {
    pub fn error(reason: ErrorReason, detail: impl Into<String>) -> Self {
        Event::Error { reason, detail: detail.into() }
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Event::Notification { message: message.into() }
    }
}

/// Either direction of the channel. The opcode decides which one a frame is.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Event(Event),
}

impl Message {
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Request(req) => match req {
                Request::Hello { .. } => Opcode::Hello,
                Request::Ping => Opcode::Ping,
                Request::RequestModels => Opcode::RequestModels,
                Request::RequestModel { .. } => Opcode::RequestModel,
                Request::UploadModel { .. } => Opcode::UploadModel,
                Request::DeleteModel { .. } => Opcode::DeleteModel,
                Request::SearchModels { .. } => Opcode::SearchModels,
                Request::GetCategories => Opcode::GetCategories,
                Request::GetModelsByCategory { .. } => Opcode::GetModelsByCategory,
                Request::GetModelInfo { .. } => Opcode::GetModelInfo,
                Request::Reload => Opcode::Reload,
                Request::BrowserOpen { .. } => Opcode::BrowserOpen,
                Request::BrowserClick { .. } => Opcode::BrowserClick,
                Request::BrowserClose => Opcode::BrowserClose,
                Request::HoldItem { .. } => Opcode::HoldItem,
                Request::Command { .. } => Opcode::Command,
            },
            Message::Event(evt) => match evt {
                Event::ModelList { .. } => Opcode::ModelList,
                Event::ModelData { .. } => Opcode::ModelData,
                Event::UploadResponse { .. } => Opcode::UploadResponse,
                Event::DeleteResponse { .. } => Opcode::DeleteResponse,
                Event::SearchResults { .. } => Opcode::SearchResults,
                Event::Categories { .. } => Opcode::Categories,
                Event::CategoryModels { .. } => Opcode::CategoryModels,
                Event::ModelInfo { .. } => Opcode::ModelInfo,
                Event::OpenBrowser => Opcode::OpenBrowser,
                Event::BrowserPage { .. } => Opcode::BrowserPage,
                Event::BrowserClosed { .. } => Opcode::BrowserClosed,
                Event::ItemApplied { .. } => Opcode::ItemApplied,
                Event::ItemGiven { .. } => Opcode::ItemGiven,
                Event::ModelSummary { .. } => Opcode::ModelSummary,
                Event::Notification { .. } => Opcode::Notification,
                Event::Pong => Opcode::Pong,
                Event::Error { .. } => Opcode::Error,
            },
        }
    }

    /// Encode as a complete frame (length header + payload).
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let payload = self.encode_payload()?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge(payload.len()));
        }
        let len = payload.len() as u32;
        let mut result = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&payload);
        Ok(result)
    }

    /// Decode the first frame in `data`, returning the message and the number
    /// of bytes it occupied.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), CodecError> {
        let (payload, consumed) = split_frame(data)?.ok_or(CodecError::Incomplete)?;
        let msg = Self::decode_payload(payload)?;
        Ok((msg, consumed))
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = WireWriter::new(self.opcode())?;
        match self {
            Message::Request(req) => match req {
                Request::Hello { viewer } => w.put_str(viewer)?,
                Request::Ping
                | Request::RequestModels
                | Request::GetCategories
                | Request::Reload
                | Request::BrowserClose => {}
                Request::RequestModel { id }
                | Request::DeleteModel { id }
                | Request::GetModelInfo { id } => w.put_str(id)?,
                Request::UploadModel { id, json, overwrite } => {
                    w.put_str(id)?;
                    w.put_str(json)?;
                    w.put_bool(*overwrite);
                }
                Request::SearchModels { query } => w.put_str(query)?,
                Request::GetModelsByCategory { category } => w.put_str(category)?,
                Request::BrowserOpen { query, category } => {
                    w.put_str(query)?;
                    w.put_str(category)?;
                }
                Request::BrowserClick { surface, slot, kind } => {
                    w.put_i64(*surface);
                    w.put_i32(*slot);
                    w.put_i32(kind.code());
                }
                Request::HoldItem { material } => w.put_str(material)?,
                Request::Command { line } => w.put_str(line)?,
            },
            Message::Event(evt) => match evt {
                Event::ModelList { models } => w.put_strs(models)?,
                Event::ModelData { id, json } => {
                    w.put_str(id)?;
                    w.put_str(json)?;
                }
                Event::UploadResponse { id, created } => {
                    w.put_str(id)?;
                    w.put_bool(*created);
                }
                Event::DeleteResponse { id, deleted } => {
                    w.put_str(id)?;
                    w.put_bool(*deleted);
                }
                Event::SearchResults { query, results } => {
                    w.put_str(query)?;
                    w.put_strs(results)?;
                }
                Event::Categories { groups } => {
                    w.put_count(groups.len())?;
                    for group in groups {
                        w.put_str(&group.name)?;
                        w.put_strs(&group.members)?;
                    }
                }
                Event::CategoryModels { category, models } => {
                    w.put_str(category)?;
                    w.put_strs(models)?;
                }
                Event::ModelInfo { id, size, category, last_modified } => {
                    w.put_str(id)?;
                    w.put_i64(*size);
                    w.put_str(category)?;
                    w.put_i64(*last_modified);
                }
                Event::OpenBrowser | Event::Pong => {}
                Event::BrowserPage { surface, page, total_pages, slots } => {
                    w.put_i64(*surface);
                    w.put_i32(*page);
                    w.put_i32(*total_pages);
                    w.put_count(slots.len())?;
                    for binding in slots {
                        w.put_i32(binding.slot);
                        w.put_str(&binding.id)?;
                    }
                }
                Event::BrowserClosed { surface } => w.put_i64(*surface),
                Event::ItemApplied { id, display_name } => {
                    w.put_str(id)?;
                    w.put_str(display_name)?;
                }
                Event::ItemGiven { id, material, display_name, custom_model_data } => {
                    w.put_str(id)?;
                    w.put_str(material)?;
                    w.put_str(display_name)?;
                    w.put_i32(*custom_model_data);
                }
                Event::ModelSummary { id, material, custom_model_data } => {
                    w.put_str(id)?;
                    w.put_str(material)?;
                    w.put_i32(*custom_model_data);
                }
                Event::Notification { message } => w.put_str(message)?,
                Event::Error { reason, detail } => {
                    w.put_str(reason.as_str())?;
                    w.put_str(detail)?;
                }
            },
        }
        Ok(w.into_bytes())
    }

    pub fn decode_payload(payload: &[u8]) -> Result<Self, CodecError> {
        let mut r = WireReader::new(payload);
        let tag = r.get_str()?;
        let op = Opcode::parse(&tag).ok_or(CodecError::UnknownOpcode(tag))?;

        let msg = match op {
            Opcode::Hello => Message::Request(Request::Hello { viewer: r.get_str()? }),
            Opcode::Ping => Message::Request(Request::Ping),
            Opcode::RequestModels => Message::Request(Request::RequestModels),
            Opcode::RequestModel => Message::Request(Request::RequestModel { id: r.get_str()? }),
            Opcode::UploadModel => Message::Request(Request::UploadModel {
                id: r.get_str()?,
                json: r.get_str()?,
                overwrite: r.get_bool()?,
            }),
            Opcode::DeleteModel => Message::Request(Request::DeleteModel { id: r.get_str()? }),
            Opcode::SearchModels => {
                Message::Request(Request::SearchModels { query: r.get_str()? })
            }
            Opcode::GetCategories => Message::Request(Request::GetCategories),
            Opcode::GetModelsByCategory => {
                Message::Request(Request::GetModelsByCategory { category: r.get_str()? })
            }
            Opcode::GetModelInfo => Message::Request(Request::GetModelInfo { id: r.get_str()? }),
            Opcode::Reload => Message::Request(Request::Reload),
            Opcode::BrowserOpen => Message::Request(Request::BrowserOpen {
                query: r.get_str()?,
                category: r.get_str()?,
            }),
            Opcode::BrowserClick => {
                let surface = r.get_i64()?;
                let slot = r.get_i32()?;
                let code = r.get_i32()?;
                let kind = InteractionKind::from_code(code)
                    .ok_or(CodecError::UnknownInteraction(code))?;
                Message::Request(Request::BrowserClick { surface, slot, kind })
            }
            Opcode::BrowserClose => Message::Request(Request::BrowserClose),
            Opcode::HoldItem => Message::Request(Request::HoldItem { material: r.get_str()? }),
            Opcode::Command => Message::Request(Request::Command { line: r.get_str()? }),

            Opcode::ModelList => Message::Event(Event::ModelList { models: r.get_strs()? }),
            Opcode::ModelData => Message::Event(Event::ModelData {
                id: r.get_str()?,
                json: r.get_str()?,
            }),
            Opcode::UploadResponse => Message::Event(Event::UploadResponse {
                id: r.get_str()?,
                created: r.get_bool()?,
            }),
            Opcode::DeleteResponse => Message::Event(Event::DeleteResponse {
                id: r.get_str()?,
                deleted: r.get_bool()?,
            }),
            Opcode::SearchResults => Message::Event(Event::SearchResults {
                query: r.get_str()?,
                results: r.get_strs()?,
            }),
            Opcode::Categories => {
                let count = r.get_count()?;
                let mut groups = Vec::new();
                for _ in 0..count {
                    let name = r.get_str()?;
                    let members = r.get_strs()?;
                    groups.push(CategoryGroup { name, members });
                }
                Message::Event(Event::Categories { groups })
            }
            Opcode::CategoryModels => Message::Event(Event::CategoryModels {
                category: r.get_str()?,
                models: r.get_strs()?,
            }),
            Opcode::ModelInfo => Message::Event(Event::ModelInfo {
                id: r.get_str()?,
                size: r.get_i64()?,
                category: r.get_str()?,
                last_modified: r.get_i64()?,
            }),
            Opcode::OpenBrowser => Message::Event(Event::OpenBrowser),
            Opcode::BrowserPage => {
                let surface = r.get_i64()?;
                let page = r.get_i32()?;
                let total_pages = r.get_i32()?;
                let count = r.get_count()?;
                let mut slots = Vec::new();
                for _ in 0..count {
                    let slot = r.get_i32()?;
                    let id = r.get_str()?;
                    slots.push(SlotBinding { slot, id });
                }
                Message::Event(Event::BrowserPage { surface, page, total_pages, slots })
            }
            Opcode::BrowserClosed => Message::Event(Event::BrowserClosed { surface: r.get_i64()? }),
            Opcode::ItemApplied => Message::Event(Event::ItemApplied {
                id: r.get_str()?,
                display_name: r.get_str()?,
            }),
            Opcode::ItemGiven => Message::Event(Event::ItemGiven {
                id: r.get_str()?,
                material: r.get_str()?,
                display_name: r.get_str()?,
                custom_model_data: r.get_i32()?,
            }),
            Opcode::ModelSummary => Message::Event(Event::ModelSummary {
                id: r.get_str()?,
                material: r.get_str()?,
                custom_model_data: r.get_i32()?,
            }),
            Opcode::Notification => {
                Message::Event(Event::Notification { message: r.get_str()? })
            }
            Opcode::Pong => Message::Event(Event::Pong),
            Opcode::Error => {
                let code = r.get_str()?;
                let reason = ErrorReason::parse(&code).ok_or(CodecError::UnknownReason(code))?;
                Message::Event(Event::Error { reason, detail: r.get_str()? })
            }
        };

        r.finish(op)?;
        Ok(msg)
    }
}

/// Split the first frame off `data`.
///
/// Returns `Ok(None)` while the frame is still incomplete and the payload
/// slice plus total consumed length once it is whole. An oversize length
/// header is an error because the stream cannot be resynchronised after it.
pub fn split_frame(data: &[u8]) -> Result<Option<(&[u8], usize)>, CodecError> {
    if data.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }
    if data.len() < FRAME_HEADER_LEN + len {
        return Ok(None);
    }
    Ok(Some((&data[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len], FRAME_HEADER_LEN + len)))
}

// ── Primitive field codec ─────────────────────────────────────────────────────

struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    fn new(op: Opcode) -> Result<Self, CodecError> {
        let mut w = Self { buf: Vec::with_capacity(64) };
        w.put_str(op.as_str())?;
        Ok(w)
    }

    fn put_str(&mut self, value: &str) -> Result<(), CodecError> {
        let len = u16::try_from(value.len()).map_err(|_| CodecError::StringTooLong(value.len()))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn put_bool(&mut self, value: bool) {
        self.put_i32(i32::from(value));
    }

    fn put_count(&mut self, count: usize) -> Result<(), CodecError> {
        let n = i32::try_from(count).map_err(|_| CodecError::CountOverflow(count))?;
        self.put_i32(n);
        Ok(())
    }

    fn put_strs(&mut self, values: &[String]) -> Result<(), CodecError> {
        self.put_count(values.len())?;
        for value in values {
            self.put_str(value)?;
        }
        Ok(())
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.remaining();
        if remaining < n {
            return Err(CodecError::Truncated { needed: n - remaining });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn get_str(&mut self) -> Result<String, CodecError> {
        let header = self.take(2)?;
        let len = u16::from_be_bytes([header[0], header[1]]) as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn get_i32(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get_i64(&mut self) -> Result<i64, CodecError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(i64::from_be_bytes(raw))
    }

    fn get_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.get_i32()? != 0)
    }

    fn get_count(&mut self) -> Result<usize, CodecError> {
        let n = self.get_i32()?;
        usize::try_from(n).map_err(|_| CodecError::NegativeCount(n))
    }

    fn get_strs(&mut self) -> Result<Vec<String>, CodecError> {
        let count = self.get_count()?;
        // Every string costs at least its two-byte header.
        let mut values = Vec::with_capacity(count.min(self.remaining() / 2));
        for _ in 0..count {
            values.push(self.get_str()?);
        }
        Ok(values)
    }

    fn finish(self, op: Opcode) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes { opcode: op.as_str(), extra }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_info_encode_decode() {
        let msg = Message::Event(Event::ModelInfo {
            id: "minecraft:coin".to_string(),
            size: 512,
            category: "items".to_string(),
            last_modified: 1000,
        });
        let encoded = msg.encode().unwrap();
        let (decoded, len) = Message::decode(&encoded).unwrap();
        assert_eq!(len, encoded.len());
        match decoded {
            Message::Event(Event::ModelInfo { id, size, category, last_modified }) => {
                assert_eq!(id, "minecraft:coin");
                assert_eq!(size, 512);
                assert_eq!(category, "items");
                assert_eq!(last_modified, 1000);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_model_list_layout_is_bit_exact() {
        let msg = Message::Event(Event::ModelList { models: vec!["a:b".to_string()] });
        let payload = msg.encode_payload().unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&10u16.to_be_bytes());
        expected.extend_from_slice(b"model_list");
        expected.extend_from_slice(&1i32.to_be_bytes());
        expected.extend_from_slice(&3u16.to_be_bytes());
        expected.extend_from_slice(b"a:b");
        assert_eq!(payload, expected);
    }

    #[test]
    fn test_categories_nested_groups() {
        let msg = Message::Event(Event::Categories {
            groups: vec![
                CategoryGroup {
                    name: "weapons".into(),
                    members: vec!["minecraft:sword".into(), "minecraft:axe".into()],
                },
                CategoryGroup { name: "items".into(), members: vec![] },
            ],
        });
        let (decoded, _) = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_unknown_opcode_fails_closed() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&7u16.to_be_bytes());
        payload.extend_from_slice(b"explode");
        assert_eq!(
            Message::decode_payload(&payload),
            Err(CodecError::UnknownOpcode("explode".to_string()))
        );
    }

    #[test]
    fn test_truncated_field_is_rejected() {
        let msg = Message::Event(Event::ModelInfo {
            id: "minecraft:coin".into(),
            size: 512,
            category: "items".into(),
            last_modified: 1000,
        });
        let payload = msg.encode_payload().unwrap();
        let cut = &payload[..payload.len() - 3];
        assert!(matches!(
            Message::decode_payload(cut),
            Err(CodecError::Truncated { needed: 3 })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut payload = Message::Request(Request::Ping).encode_payload().unwrap();
        payload.push(0);
        assert!(matches!(
            Message::decode_payload(&payload),
            Err(CodecError::TrailingBytes { opcode: "ping", extra: 1 })
        ));
    }

    #[test]
    fn test_split_frame_waits_for_whole_frame() {
        let encoded = Message::Request(Request::Ping).encode().unwrap();
        assert_eq!(split_frame(&encoded[..2]), Ok(None));
        assert_eq!(split_frame(&encoded[..encoded.len() - 1]), Ok(None));
        let (payload, consumed) = split_frame(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(payload.len(), encoded.len() - 4);
        assert_eq!(Message::decode(&encoded[..1]), Err(CodecError::Incomplete));
    }

    #[test]
    fn test_oversize_frame_header() {
        let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        assert_eq!(split_frame(&header), Err(CodecError::FrameTooLarge(MAX_FRAME_LEN + 1)));
    }

    #[test]
    fn test_unknown_interaction_code() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&13u16.to_be_bytes());
        payload.extend_from_slice(b"browser_click");
        payload.extend_from_slice(&1i64.to_be_bytes());
        payload.extend_from_slice(&9i32.to_be_bytes());
        payload.extend_from_slice(&42i32.to_be_bytes());
        assert_eq!(
            Message::decode_payload(&payload),
            Err(CodecError::UnknownInteraction(42))
        );
    }

    #[test]
    fn test_oversize_string_refused_on_encode() {
        let msg = Message::Event(Event::notification("x".repeat(70_000)));
        assert_eq!(msg.encode(), Err(CodecError::StringTooLong(70_000)));
    }

    #[test]
    fn test_opcode_table_is_consistent() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::parse(op.as_str()), Some(op));
        }
        assert!(Opcode::Hello.is_request());
        assert!(!Opcode::ModelList.is_request());
    }
}
