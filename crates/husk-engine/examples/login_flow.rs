//! Example: driving a login flow against an in-process application

use husk_engine::{Browser, RouteReply, Router};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // The application under test: a login page and an RPC endpoint.
    let mut app = Router::new();
    app.page(
        "/login",
        "<html><head><title>Login</title></head><body>\
         <form id=\"login\" action=\"/session\" method=\"post\">\
         <input type=\"text\" name=\"user\" value=\"\">\
         <input type=\"password\" name=\"pass\" value=\"\">\
         </form>\
         <div id=\"content\"></div>\
         </body></html>",
    );
    app.route("POST", "/session", |_| {
        RouteReply::html(
            "<html><head><title>Home</title></head><body>\
             <div id=\"content\">signed in</div></body></html>",
        )
    });
    app.route("POST", "/rpc", |_| {
        RouteReply::json(&json!({
            "result": { "content": "<p>3 new messages</p>" }
        }))
    });

    let mut browser = Browser::new(Box::new(app));

    browser.get("http://app/login")?;
    browser.set_field(0, "user", "alice")?;
    browser.set_field(0, "pass", "hunter2")?;
    browser.submit(0)?;
    println!("signed in as: {:?}", browser.title());

    browser.call_with_defaults("http://app/rpc", "inbox.peek", json!({}))?;
    println!("page after RPC patch:\n{}", browser.snapshot().html().unwrap_or(""));

    for line in browser.activity().messages() {
        println!("activity: {line}");
    }
    Ok(())
}
