//! Mock drive API server for testing
//!
//! One local HTTP server answering both the Graph and the Google Drive
//! routes the clients use:
//! - Graph: user lookup, drive quota, paged `children` listing, content download by link
//!   or endpoint, simple PUT, upload sessions (202 until complete), DELETE
//! - Google: `about`, `files.list` search, folder create, resumable sessions (308
//!   until complete), DELETE
//!
//! Pre-authenticated URLs (download links, session URLs) reject requests
//! that carry a bearer token.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use serde_json::{json, Value};

const GRAPH_PAGE_SIZE: usize = 2;
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const STORAGE_LIMIT: u64 = 1 << 40;

struct GraphFile {
    id: String,
    bytes: Vec<u8>,
}

struct GoogleFile {
    name: String,
    parent: String,
    bytes: Vec<u8>,
}

enum SessionTarget {
    Graph(String),
    Google { name: String, parent: String },
}

struct Session {
    target: SessionTarget,
    buffer: Vec<u8>,
}

#[derive(Default)]
struct MockState {
    base_url: String,
    next_id: usize,
    reject_tokens: bool,
    requests: Vec<String>,
    graph_users: HashMap<String, String>,
    graph_files: BTreeMap<String, GraphFile>,
    google_folders: BTreeMap<String, String>,
    google_files: BTreeMap<String, GoogleFile>,
    sessions: HashMap<String, Session>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// Mock drive server for testing
pub struct MockDriveServer {
    port: u16,
    state: Arc<Mutex<MockState>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MockDriveServer {
    /// Start on a random available port
    pub fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let state = Arc::new(Mutex::new(MockState {
            base_url: format!("http://127.0.0.1:{}", port),
            ..Default::default()
        }));

        // Non-blocking so the accept loop notices shutdown
        listener.set_nonblocking(true)?;

        let running_clone = running.clone();
        let state_clone = state.clone();
        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let state = state_clone.clone();
                        thread::spawn(move || handle_connection(stream, &state));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            state,
            running,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    pub fn add_graph_user(&self, identifier: &str, id: &str) {
        self.state()
            .graph_users
            .insert(identifier.to_string(), id.to_string());
    }

    pub fn add_graph_file(&self, path: &str, bytes: Vec<u8>) {
        let mut state = self.state();
        let id = state.next_id("item");
        state
            .graph_files
            .insert(path.to_string(), GraphFile { id, bytes });
    }

    pub fn graph_file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().graph_files.get(path).map(|f| f.bytes.clone())
    }

    pub fn google_folder_count(&self) -> usize {
        self.state().google_folders.len()
    }

    pub fn google_file(&self, id: &str) -> Option<Vec<u8>> {
        self.state().google_files.get(id).map(|f| f.bytes.clone())
    }

    /// Answer 401 to every request carrying a bearer token
    pub fn reject_tokens(&self) {
        self.state().reject_tokens = true;
    }

    /// `METHOD path?query` of every request received
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockDriveServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// HTTP plumbing
// =============================================================================

struct Request {
    method: String,
    target: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn has_token(&self) -> bool {
        self.header("authorization")
            .map(|v| v.to_lowercase().starts_with("bearer "))
            .unwrap_or(false)
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: value.to_string().into_bytes(),
        }
    }

    fn bytes(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![(
                "Content-Type".to_string(),
                "application/octet-stream".to_string(),
            )],
            body,
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn error(status: u16, code: &str, message: &str) -> Self {
        Self::json(status, json!({ "error": { "code": code, "message": message } }))
    }

    fn with_header(mut self, name: &str, value: String) -> Self {
        self.headers.push((name.to_string(), value));
        self
    }
}

fn handle_connection(mut stream: TcpStream, state: &Mutex<MockState>) {
    let _ = stream.set_nonblocking(false);
    let Some(request) = read_request(&mut stream) else {
        send_reply(&mut stream, Reply::error(400, "badRequest", "Invalid request"));
        return;
    };

    let reply = {
        let mut state = lock(state);
        state
            .requests
            .push(format!("{} {}", request.method, request.target));
        if state.reject_tokens && request.has_token() {
            Reply::error(401, "InvalidAuthenticationToken", "Access token has expired")
        } else {
            route(&mut state, &request)
        }
    };
    send_reply(&mut stream, reply);
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buffer = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buffer[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = data[header_end..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buffer[..n]);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.clone(), String::new()),
    };
    let query = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    Some(Request {
        method,
        target,
        path,
        query,
        headers,
        body,
    })
}

fn send_reply(stream: &mut TcpStream, reply: Reply) {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reason(reply.status),
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&reply.body);
    let _ = stream.flush();
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        308 => "Resume Incomplete",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        416 => "Range Not Satisfiable",
        _ => "Unknown",
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

/// Parse `bytes a-b/total` (or `bytes */total`) into (offset, total)
fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let total = total.parse().ok()?;
    if range == "*" {
        return Some((total, total));
    }
    let (start, _) = range.split_once('-')?;
    Some((start.parse().ok()?, total))
}

// =============================================================================
// Routing
// =============================================================================

fn route(state: &mut MockState, request: &Request) -> Reply {
    let path = request.path.as_str();

    if path == "/oauth/token" {
        return oauth_token(request);
    }
    if let Some(id) = path.strip_prefix("/download/") {
        return graph_download_link(state, request, id);
    }
    if let Some(id) = path.strip_prefix("/graph-session/") {
        return session_chunk(state, request, &format!("graph-session/{}", id));
    }
    if let Some(id) = path.strip_prefix("/google-session/") {
        return session_chunk(state, request, &format!("google-session/{}", id));
    }
    if path == "/upload/drive/v3/files" {
        return google_open_session(state, request);
    }
    if path == "/drive/v3/about" {
        return google_about(state, request);
    }
    if path == "/drive/v3/files" {
        return match request.method.as_str() {
            "GET" => google_search(state, request),
            "POST" => google_create_folder(state, request),
            _ => Reply::error(405, "methodNotAllowed", "Method not allowed"),
        };
    }
    if let Some(id) = path.strip_prefix("/drive/v3/files/") {
        return google_delete(state, request, &percent_decode(id));
    }
    if let Some(rest) = path.strip_prefix("/users/") {
        return graph_route(state, request, rest);
    }

    Reply::error(404, "notFound", "Endpoint not found")
}

fn oauth_token(request: &Request) -> Reply {
    let form: HashMap<String, String> = url::form_urlencoded::parse(&request.body)
        .into_owned()
        .collect();
    let grant = form.get("grant_type").map(String::as_str).unwrap_or_default();
    let valid = match grant {
        "client_credentials" => form.contains_key("client_secret") && form.contains_key("scope"),
        "refresh_token" => form.get("refresh_token").map_or(false, |t| t != "revoked"),
        _ => false,
    };
    if !valid {
        return Reply::json(
            400,
            json!({ "error": "invalid_grant", "error_description": "Grant rejected" }),
        );
    }
    Reply::json(
        200,
        json!({
            "access_token": format!("{}-token", grant),
            "token_type": "Bearer",
            "expires_in": 3600
        }),
    )
}

fn graph_route(state: &mut MockState, request: &Request, rest: &str) -> Reply {
    if !request.has_token() {
        return Reply::error(401, "unauthenticated", "Missing bearer token");
    }
    if let Some(id) = rest.strip_suffix("/drive") {
        return graph_drive(state, &percent_decode(id));
    }
    let Some((_, drive_path)) = rest.split_once("/drive/") else {
        let identifier = percent_decode(rest);
        return match state.graph_users.get(&identifier) {
            Some(id) => Reply::json(200, json!({ "id": id, "userPrincipalName": identifier })),
            None => Reply::error(404, "Request_ResourceNotFound", "User not found"),
        };
    };

    if let Some(item) = drive_path.strip_prefix("items/") {
        let id = item.trim_end_matches("/content");
        return match state.graph_files.values().find(|f| f.id == id) {
            Some(file) => Reply::bytes(file.bytes.clone()),
            None => Reply::error(404, "itemNotFound", "Item not found"),
        };
    }

    let (item_path, action) = if drive_path == "root/children" {
        (String::new(), "/children")
    } else if let Some(addressed) = drive_path.strip_prefix("root:") {
        match addressed.split_once(':') {
            Some((p, action)) => (percent_decode(p), action),
            None => (percent_decode(addressed), ""),
        }
    } else {
        return Reply::error(404, "notFound", "Endpoint not found");
    };

    match (request.method.as_str(), action) {
        ("GET", "/children") => graph_children(state, request, &item_path),
        ("PUT", "/content") => {
            let size = request.body.len();
            let id = state.next_id("item");
            state.graph_files.insert(
                item_path.clone(),
                GraphFile {
                    id: id.clone(),
                    bytes: request.body.clone(),
                },
            );
            Reply::json(201, json!({ "id": id, "name": item_path, "size": size }))
        }
        ("POST", "/createUploadSession") => {
            let key = state
                .next_id("graph-session")
                .replace("graph-session-", "graph-session/");
            state.sessions.insert(
                key.clone(),
                Session {
                    target: SessionTarget::Graph(item_path),
                    buffer: Vec::new(),
                },
            );
            Reply::json(200, json!({ "uploadUrl": format!("{}/{}", state.base_url, key) }))
        }
        ("DELETE", "") => match state.graph_files.remove(&item_path) {
            Some(_) => Reply::empty(204),
            None => Reply::error(404, "itemNotFound", "Item not found"),
        },
        _ => Reply::error(405, "methodNotAllowed", "Method not allowed"),
    }
}

fn graph_children(state: &MockState, request: &Request, folder: &str) -> Reply {
    let prefix = format!("{}/", folder.trim_end_matches('/'));
    let mut children: BTreeMap<String, Value> = BTreeMap::new();

    for (path, file) in &state.graph_files {
        let Some(rest) = path.strip_prefix(&prefix) else { continue };
        match rest.split_once('/') {
            Some((sub, _)) => {
                let entry = children.entry(sub.to_string()).or_insert_with(|| {
                    json!({
                        "id": format!("folder:{}{}", prefix, sub),
                        "name": sub,
                        "folder": { "childCount": 0 }
                    })
                });
                if let Some(count) = entry["folder"]["childCount"].as_u64() {
                    entry["folder"]["childCount"] = json!(count + 1);
                }
            }
            None => {
                children.insert(
                    rest.to_string(),
                    json!({
                        "id": file.id,
                        "name": rest,
                        "size": file.bytes.len(),
                        "lastModifiedDateTime": "2024-06-01T12:00:00Z",
                        "file": { "mimeType": "application/octet-stream" },
                        "@microsoft.graph.downloadUrl":
                            format!("{}/download/{}", state.base_url, file.id),
                    }),
                );
            }
        }
    }

    if children.is_empty() && !folder.is_empty() {
        return Reply::error(404, "itemNotFound", "The resource could not be found.");
    }

    let all: Vec<Value> = children.into_values().collect();
    let skip: usize = request
        .query
        .get("$skiptoken")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let page: Vec<Value> = all.iter().skip(skip).take(GRAPH_PAGE_SIZE).cloned().collect();

    let mut body = json!({ "value": page });
    if skip + GRAPH_PAGE_SIZE < all.len() {
        body["@odata.nextLink"] = json!(format!(
            "{}{}?$skiptoken={}",
            state.base_url,
            request.path,
            skip + GRAPH_PAGE_SIZE
        ));
    }
    Reply::json(200, body)
}

fn graph_download_link(state: &MockState, request: &Request, id: &str) -> Reply {
    if request.has_token() {
        return Reply::error(400, "badRequest", "Pre-authenticated URL received a token");
    }
    match state.graph_files.values().find(|f| f.id == id) {
        Some(file) => Reply::bytes(file.bytes.clone()),
        None => Reply::error(404, "itemNotFound", "Item not found"),
    }
}

fn session_chunk(state: &mut MockState, request: &Request, key: &str) -> Reply {
    if request.method != "PUT" {
        return Reply::error(405, "methodNotAllowed", "Method not allowed");
    }
    if request.has_token() {
        return Reply::error(400, "badRequest", "Upload URL received a token");
    }
    let Some((offset, total)) = request.header("content-range").and_then(parse_content_range)
    else {
        return Reply::error(400, "badRequest", "Missing Content-Range");
    };
    let Some(session) = state.sessions.get_mut(key) else {
        return Reply::error(404, "itemNotFound", "Upload session not found");
    };
    if offset != session.buffer.len() as u64 {
        return Reply::error(416, "invalidRange", "Unexpected offset");
    }

    session.buffer.extend_from_slice(&request.body);
    let received = session.buffer.len() as u64;
    let is_google = matches!(session.target, SessionTarget::Google { .. });

    if received < total {
        return if is_google {
            Reply::empty(308).with_header("Range", format!("bytes=0-{}", received - 1))
        } else {
            Reply::json(
                202,
                json!({ "nextExpectedRanges": [format!("{}-", received)] }),
            )
        };
    }

    let Some(done) = state.sessions.remove(key) else {
        return Reply::error(404, "itemNotFound", "Upload session not found");
    };
    let size = done.buffer.len();
    match done.target {
        SessionTarget::Graph(path) => {
            let id = state.next_id("item");
            state.graph_files.insert(
                path.clone(),
                GraphFile {
                    id: id.clone(),
                    bytes: done.buffer,
                },
            );
            Reply::json(201, json!({ "id": id, "name": path, "size": size }))
        }
        SessionTarget::Google { name, parent } => {
            let id = state.next_id("file");
            state.google_files.insert(
                id.clone(),
                GoogleFile {
                    name: name.clone(),
                    parent,
                    bytes: done.buffer,
                },
            );
            Reply::json(
                200,
                json!({ "id": id, "name": name, "size": size.to_string() }),
            )
        }
    }
}

/// Pull `'value'` out of a Drive query after `marker`
fn query_value<'a>(query: &'a str, marker: &str) -> Option<&'a str> {
    let start = query.find(marker)? + marker.len();
    let rest = &query[start..];
    let end = rest.find('\'')?;
    Some(&rest[..end])
}

fn graph_drive(state: &MockState, id: &str) -> Reply {
    let Some(owner) = state
        .graph_users
        .iter()
        .find(|(_, user_id)| user_id.as_str() == id)
        .map(|(identifier, _)| identifier)
    else {
        return Reply::error(404, "Request_ResourceNotFound", "User not found");
    };
    let used: usize = state.graph_files.values().map(|f| f.bytes.len()).sum();
    Reply::json(
        200,
        json!({
            "id": format!("drive-{}", id),
            "driveType": "business",
            "owner": { "user": { "id": id, "displayName": owner } },
            "quota": { "used": used, "total": STORAGE_LIMIT, "state": "normal" }
        }),
    )
}

fn google_about(state: &MockState, request: &Request) -> Reply {
    if !request.has_token() {
        return Reply::error(401, "unauthenticated", "Missing bearer token");
    }
    let used: usize = state.google_files.values().map(|f| f.bytes.len()).sum();
    // Drive v3 encodes int64 fields as strings
    Reply::json(
        200,
        json!({
            "user": { "displayName": "Backup Robot", "emailAddress": "robot@example.com" },
            "storageQuota": { "limit": STORAGE_LIMIT.to_string(), "usage": used.to_string() }
        }),
    )
}

fn google_search(state: &MockState, request: &Request) -> Reply {
    if !request.has_token() {
        return Reply::error(401, "unauthenticated", "Missing bearer token");
    }
    let q = request.query.get("q").cloned().unwrap_or_default();
    let Some(name) = query_value(&q, "name='") else {
        return Reply::error(400, "invalid", "Unsupported query");
    };

    let files: Vec<Value> = if q.contains(FOLDER_MIME_TYPE) {
        state
            .google_folders
            .iter()
            .filter(|(_, n)| n.as_str() == name)
            .map(|(id, _)| json!({ "id": id }))
            .collect()
    } else {
        let parent = q
            .split(" and ")
            .find(|clause| clause.ends_with(" in parents"))
            .and_then(|clause| query_value(clause, "'"));
        state
            .google_files
            .iter()
            .filter(|(_, f)| f.name == name && parent.map_or(true, |p| f.parent == p))
            .map(|(id, f)| json!({ "id": id, "size": f.bytes.len().to_string() }))
            .collect()
    };
    Reply::json(200, json!({ "files": files }))
}

fn google_create_folder(state: &mut MockState, request: &Request) -> Reply {
    if !request.has_token() {
        return Reply::error(401, "unauthenticated", "Missing bearer token");
    }
    let body = request.json();
    let Some(name) = body["name"].as_str() else {
        return Reply::error(400, "invalid", "Missing name");
    };
    if body["mimeType"].as_str() != Some(FOLDER_MIME_TYPE) {
        return Reply::error(400, "invalid", "Only folders can be created without upload");
    }
    let id = state.next_id("folder");
    state.google_folders.insert(id.clone(), name.to_string());
    Reply::json(200, json!({ "id": id }))
}

fn google_open_session(state: &mut MockState, request: &Request) -> Reply {
    if !request.has_token() {
        return Reply::error(401, "unauthenticated", "Missing bearer token");
    }
    if request.query.get("uploadType").map(String::as_str) != Some("resumable") {
        return Reply::error(400, "invalid", "Expected uploadType=resumable");
    }
    let body = request.json();
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let parent = body["parents"][0].as_str().unwrap_or_default().to_string();

    let id = state.next_id("google-session");
    let key = id.replace("google-session-", "google-session/");
    state.sessions.insert(
        key.clone(),
        Session {
            target: SessionTarget::Google { name, parent },
            buffer: Vec::new(),
        },
    );
    Reply::empty(200).with_header("Location", format!("{}/{}", state.base_url, key))
}

fn google_delete(state: &mut MockState, request: &Request, id: &str) -> Reply {
    if request.method != "DELETE" {
        return Reply::error(405, "methodNotAllowed", "Method not allowed");
    }
    match state.google_files.remove(id) {
        Some(_) => Reply::empty(204),
        None => Reply::error(404, "notFound", "File not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("Shared%20Docs"), "Shared Docs");
        assert_eq!(percent_decode("plain"), "plain");
        assert_eq!(percent_decode("100%"), "100%");
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("bytes 0-9/25"), Some((0, 25)));
        assert_eq!(parse_content_range("bytes */0"), Some((0, 0)));
        assert_eq!(parse_content_range("junk"), None);
    }
}
