//! Two-page government board served from a background thread.
//!
//! Page 1 lists articles 3 and 2, page 2 lists article 1. Articles 1 and 2
//! link their PDF directly; article 3 only has a download button whose
//! handler points at `/download.do`.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub struct BoardServer {
    pub base_url: String,
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BoardServer {
    pub fn listing_url(&self) -> String {
        format!("{}/board/list.do", self.base_url)
    }
}

impl Drop for BoardServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn pdf_bytes(tag: &str) -> Vec<u8> {
    let mut body = format!("%PDF-1.4\n% {tag}\n").into_bytes();
    body.extend(std::iter::repeat_n(b'0', 2048));
    body.extend_from_slice(b"\n%%EOF\n");
    body
}

fn row(no: u32, title: &str) -> String {
    format!(
        r#"<tr><td>{no}</td><td class="subject"><a href="view.do?no={no}">{title}</a></td><td>2024-05-0{no}</td></tr>"#
    )
}

fn listing(rows: &[String], pager: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><title>공지사항</title></head>
  <body>
    <table class="board-list">
      <thead><tr><th>번호</th><th>제목</th><th>등록일</th></tr></thead>
      <tbody>{}</tbody>
    </table>
    <div class="paging">{pager}</div>
  </body>
</html>
"#,
        rows.join("\n")
    )
}

fn article(no: u32, files: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><title>게시글 {no}</title></head>
  <body>
    <h3>Rental housing notice {no}</h3>
    <p>Applications open next month.</p>
    <div class="file-area"><span>첨부파일</span> {files}</div>
  </body>
</html>
"#
    )
}

enum Body {
    Html(String),
    Pdf(Vec<u8>, Option<&'static str>),
    Missing,
}

fn route(url: &str) -> Body {
    match url {
        "/board/list.do" | "/board/list.do?page=1" => Body::Html(listing(
            &[
                row(3, "Autumn rental housing notice"),
                row(2, "Summer rental housing notice"),
            ],
            r#"<strong>1</strong> <a href="list.do?page=2">2</a>"#,
        )),
        "/board/list.do?page=2" => Body::Html(listing(
            &[row(1, "Spring rental housing notice")],
            r#"<a href="list.do?page=1">1</a> <strong>2</strong>"#,
        )),
        "/board/view.do?no=1" => Body::Html(article(
            1,
            r#"<a href="/files/notice1.pdf">notice1.pdf</a>"#,
        )),
        "/board/view.do?no=2" => Body::Html(article(
            2,
            r#"<a href="/files/notice2.pdf">notice2.pdf</a>"#,
        )),
        "/board/view.do?no=3" => Body::Html(article(
            3,
            r#"<button type="button" onclick="location.href='/download.do?fileId=3'">다운로드</button>"#,
        )),
        "/files/notice1.pdf" => Body::Pdf(pdf_bytes("notice1"), None),
        "/files/notice2.pdf" => Body::Pdf(pdf_bytes("notice2"), None),
        "/download.do?fileId=3" => Body::Pdf(
            pdf_bytes("notice3"),
            Some(r#"attachment; filename="notice3.pdf""#),
        ),
        _ => Body::Missing,
    }
}

pub fn spawn_board_server() -> BoardServer {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let base_url = format!("http://{}", server.server_addr());
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let url = request.url().to_string();
            let response = match route(&url) {
                Body::Html(html) => tiny_http::Response::from_data(html.into_bytes()).with_header(
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
                        .expect("content-type header"),
                ),
                Body::Pdf(bytes, disposition) => {
                    let mut response = tiny_http::Response::from_data(bytes).with_header(
                        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/pdf"[..])
                            .expect("content-type header"),
                    );
                    if let Some(value) = disposition {
                        response = response.with_header(
                            tiny_http::Header::from_bytes(&b"Content-Disposition"[..], value.as_bytes())
                                .expect("content-disposition header"),
                        );
                    }
                    response
                }
                Body::Missing => tiny_http::Response::from_data(b"not found".to_vec())
                    .with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });

    BoardServer {
        base_url,
        shutdown_tx,
        handle: Some(handle),
    }
}
