#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEACHER: &str = "t.jones@school.example";
pub const DATE: &str = "2024-02-10";
pub const PERIOD: &str = "09:00-10:00";

pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: String,
}

pub enum HttpResponse {
    Json {
        status: u16,
        body: String,
        delay: Duration,
    },
    /// Close the socket without answering, which the client sees as a transport error.
    Hangup,
}

impl HttpResponse {
    pub fn json(status: u16, body: Value) -> Self {
        HttpResponse::Json {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        HttpResponse::Json {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(self, by: Duration) -> Self {
        match self {
            HttpResponse::Json { status, body, .. } => HttpResponse::Json {
                status,
                body,
                delay: by,
            },
            HttpResponse::Hangup => HttpResponse::Hangup,
        }
    }
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(b) => {
                        out.push(b);
                        i += 2;
                    }
                    Err(_) => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

fn parse_target(target: &str) -> (String, HashMap<String, String>) {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let query = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect();
    (path.to_string(), query)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        207 => "Multi-Status",
        400 => "Bad Request",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Status",
    }
}

fn serve(stream: TcpStream, school: &School) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("/").to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).unwrap_or(0) == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    if reader.read_exact(&mut body).is_err() {
        return;
    }

    let (path, query) = parse_target(&target);
    let req = HttpRequest {
        method,
        path,
        query,
        body: String::from_utf8_lossy(&body).to_string(),
    };

    let mut stream = stream;
    match school.handle(&req) {
        HttpResponse::Hangup => {}
        HttpResponse::Json {
            status,
            body,
            delay,
        } => {
            std::thread::sleep(delay);
            let _ = write!(
                stream,
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason(status),
                body.len(),
                body
            );
            let _ = stream.flush();
        }
    }
}

/// Scripted stand-in for the school REST API.
pub struct School {
    pub students: Mutex<Value>,
    pub classes: Value,
    pub timetable: Value,
    pub records: Mutex<Vec<Value>>,
    pub teacher_rows: Mutex<Vec<Value>>,
    pub bulk_replies: Mutex<VecDeque<HttpResponse>>,
    pub posted: Mutex<Vec<Value>>,
    pub slow_periods: Mutex<HashMap<String, Duration>>,
    pub failing_paths: Mutex<Vec<String>>,
}

impl School {
    pub fn class_five() -> School {
        School {
            students: Mutex::new(json!([
                { "email": "alice@x", "fullname": "Alice Abara", "class_id": 5, "profile_picture": null },
                { "email": "bob@x", "fullname": "Bob Banda", "class_id": 5 },
                { "email": "carol@x", "fullname": "Carol Chege", "class_id": 5 },
                { "email": "dan@x", "fullname": "Dan Doe", "class_id": 6 }
            ])),
            classes: json!([
                { "id": 5, "class_name": "Grade 5", "section": "B" },
                { "id": 6, "class_name": "Grade 6", "section": "A" },
                { "id": 7, "class_name": "Grade 7", "section": "A" }
            ]),
            timetable: json!([
                { "teacher": TEACHER, "class_id": 5, "subject": 2, "subject_name": "Mathematics", "period": "09:00-10:00" },
                { "teacher": TEACHER, "class_id": 5, "subject": 2, "subject_name": "Mathematics", "period": "10:00-11:00" },
                { "teacher": TEACHER, "class_id": 6, "subject": 3, "subject_name": "Science" },
                { "teacher": "other@school.example", "class_id": 7, "subject": 2, "subject_name": "Mathematics" }
            ]),
            records: Mutex::new(Vec::new()),
            teacher_rows: Mutex::new(Vec::new()),
            bulk_replies: Mutex::new(VecDeque::new()),
            posted: Mutex::new(Vec::new()),
            slow_periods: Mutex::new(HashMap::new()),
            failing_paths: Mutex::new(Vec::new()),
        }
    }

    pub fn push_record(&self, student: &str, date: &str, period: &str, status: &str) {
        self.records.lock().expect("records").push(json!({
            "student": student,
            "date": date,
            "class_id": 5,
            "subject": 2,
            "period": period,
            "status": status,
            "created_time": format!("{}T08:00:00Z", date),
        }));
    }

    pub fn push_bulk_reply(&self, reply: HttpResponse) {
        self.bulk_replies.lock().expect("bulk replies").push_back(reply);
    }

    pub fn slow_period(&self, period: &str, by: Duration) {
        self.slow_periods
            .lock()
            .expect("slow periods")
            .insert(period.to_string(), by);
    }

    pub fn fail_path(&self, path: &str) {
        self.failing_paths
            .lock()
            .expect("failing paths")
            .push(path.to_string());
    }

    pub fn posted(&self) -> Vec<Value> {
        self.posted.lock().expect("posted").clone()
    }

    fn attendance_rows(&self, q: &HashMap<String, String>) -> Value {
        let want = |row: &Value, col: &str, param: &str| match q.get(param) {
            None => true,
            Some(v) => match &row[col] {
                Value::String(s) => s == v,
                other => other.to_string() == *v,
            },
        };
        let rows: Vec<Value> = self
            .records
            .lock()
            .expect("records")
            .iter()
            .filter(|r| {
                want(r, "date", "date")
                    && want(r, "class_id", "class_id")
                    && want(r, "subject", "subject")
                    && want(r, "period", "period")
            })
            .cloned()
            .collect();
        Value::Array(rows)
    }

    /// Upserts by (student, date, class, subject, period), like the real endpoint.
    fn accept_items(&self, items: &[Value]) {
        let mut records = self.records.lock().expect("records");
        for item in items {
            let same_key = |r: &Value| {
                ["student", "date", "class_id", "subject", "period"]
                    .iter()
                    .all(|k| r[*k] == item[*k])
            };
            records.retain(|r| !same_key(r));
            records.push(item.clone());
        }
    }

    pub fn handle(&self, req: &HttpRequest) -> HttpResponse {
        if self
            .failing_paths
            .lock()
            .expect("failing paths")
            .iter()
            .any(|p| req.path.ends_with(p.as_str()))
        {
            return HttpResponse::raw(502, "<html>bad gateway</html>");
        }
        match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/api/students/") => {
                HttpResponse::json(200, self.students.lock().expect("students").clone())
            }
            ("GET", "/api/classes/") => HttpResponse::json(200, self.classes.clone()),
            ("GET", "/api/timetable/") => HttpResponse::json(200, self.timetable.clone()),
            ("GET", "/api/student_attendance/") => {
                let resp = HttpResponse::json(200, self.attendance_rows(&req.query));
                let delay = req.query.get("period").and_then(|p| {
                    self.slow_periods
                        .lock()
                        .expect("slow periods")
                        .get(p)
                        .copied()
                });
                match delay {
                    Some(d) => resp.delayed(d),
                    None => resp,
                }
            }
            ("POST", "/api/student_attendance/bulk_create/") => {
                let items: Value = serde_json::from_str(&req.body).unwrap_or(Value::Null);
                self.posted.lock().expect("posted").push(items.clone());
                if let Some(reply) = self.bulk_replies.lock().expect("bulk replies").pop_front() {
                    return reply;
                }
                let items = items.as_array().cloned().unwrap_or_default();
                self.accept_items(&items);
                HttpResponse::json(201, json!({ "success": true, "created_count": items.len() }))
            }
            ("GET", "/api/attendance/") => {
                let date = req.query.get("date").cloned().unwrap_or_default();
                let rows: Vec<Value> = self
                    .teacher_rows
                    .lock()
                    .expect("teacher rows")
                    .iter()
                    .filter(|r| r["date"] == date.as_str())
                    .cloned()
                    .collect();
                HttpResponse::json(200, Value::Array(rows))
            }
            _ => HttpResponse::json(404, json!({ "detail": "Not found." })),
        }
    }
}

pub struct FakeServer {
    pub base_url: String,
    pub school: Arc<School>,
}

impl FakeServer {
    pub fn start(school: School) -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        let school = Arc::new(school);
        let shared = school.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let school = shared.clone();
                std::thread::spawn(move || serve(stream, &school));
            }
        });
        FakeServer {
            base_url: format!("http://{}/api", addr),
            school,
        }
    }
}

pub struct Sidecar {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
    stash: Vec<Value>,
}

impl Sidecar {
    pub fn spawn(base_url: &str) -> Sidecar {
        let exe = env!("CARGO_BIN_EXE_attendanced");
        let mut child = Command::new(exe)
            .env("ATTENDANCED_API_BASE_URL", base_url)
            .env("ATTENDANCED_TIMEOUT_MS", "5000")
            .env("ATTENDANCED_LOG", "warn")
            .env_remove("ATTENDANCED_CONFIG")
            .env_remove("ATTENDANCED_TEACHER_EMAIL")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn attendanced");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin: Some(stdin),
            reader: BufReader::new(stdout),
            stash: Vec::new(),
        }
    }

    /// Spawns and opens a session for the fixture teacher.
    pub fn signed_in(base_url: &str) -> Sidecar {
        let mut sidecar = Sidecar::spawn(base_url);
        sidecar.request_ok("session", "session.open", json!({ "teacherEmail": TEACHER }));
        sidecar
    }

    pub fn send(&mut self, id: &str, method: &str, params: Value) {
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let stdin = self.stdin.as_mut().expect("stdin open");
        writeln!(stdin, "{}", payload).expect("write request");
        stdin.flush().expect("flush request");
    }

    pub fn send_raw(&mut self, line: &str) {
        let stdin = self.stdin.as_mut().expect("stdin open");
        writeln!(stdin, "{}", line).expect("write raw line");
        stdin.flush().expect("flush raw line");
    }

    pub fn next_line(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "sidecar closed stdout");
        serde_json::from_str(line.trim()).expect("parse response json")
    }

    /// Responses can arrive out of order; others are kept for later waits.
    pub fn wait(&mut self, id: &str) -> Value {
        if let Some(pos) = self
            .stash
            .iter()
            .position(|v| v.get("id").and_then(|i| i.as_str()) == Some(id))
        {
            return self.stash.remove(pos);
        }
        loop {
            let value = self.next_line();
            if value.get("id").and_then(|i| i.as_str()) == Some(id) {
                return value;
            }
            self.stash.push(value);
        }
    }

    /// Ids of responses in the order they arrived, for `n` responses.
    pub fn arrival_order(&mut self, n: usize) -> Vec<(String, Value)> {
        let mut out: Vec<(String, Value)> = self
            .stash
            .drain(..)
            .map(|v| (v["id"].as_str().unwrap_or("").to_string(), v))
            .collect();
        while out.len() < n {
            let v = self.next_line();
            out.push((v["id"].as_str().unwrap_or("").to_string(), v));
        }
        out
    }

    pub fn request(&mut self, id: &str, method: &str, params: Value) -> Value {
        self.send(id, method, params);
        self.wait(id)
    }

    pub fn request_ok(&mut self, id: &str, method: &str, params: Value) -> Value {
        let value = self.request(id, method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    pub fn select(&mut self, id: &str, period: &str) -> Value {
        self.request_ok(
            id,
            "attendance.select",
            json!({ "date": DATE, "classId": 5, "subjectId": 2, "period": period }),
        )
    }

    pub fn mark(&mut self, id: &str, email: &str, status: &str) -> Value {
        self.request_ok(
            id,
            "attendance.mark",
            json!({ "studentEmail": email, "status": status }),
        )
    }

    /// Closes stdin, drains every remaining response and waits for exit.
    pub fn finish(&mut self) -> (Vec<Value>, ExitStatus) {
        drop(self.stdin.take());
        let mut rest: Vec<Value> = self.stash.drain(..).collect();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            if !line.trim().is_empty() {
                rest.push(serde_json::from_str(line.trim()).expect("parse response json"));
            }
        }
        let status = self.child.wait().expect("wait for sidecar");
        (rest, status)
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn statuses(view: &Value) -> Vec<(String, String)> {
    view["rows"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|r| {
            (
                r["email"].as_str().unwrap_or("").to_string(),
                r["status"].as_str().unwrap_or("").to_string(),
            )
        })
        .collect()
}
