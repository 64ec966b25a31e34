use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use gondola_api::{app, password::hash_password, state::AuthConfig, worker::run_sweep, AppState};
use gondola_booking::{BookingDesk, CheckoutOrchestrator, MockPaymentProvider, Notifier, RecordingSmsSender};
use gondola_catalog::ScheduleLimits;
use gondola_core::repository::{AdminRepository, FlightRepository};
use gondola_core::FlightStatus;
use gondola_store::MemoryStore;
use serde_json::{json, Value};
use tower::ServiceExt;

const PASSWORD: &str = "correct-horse-battery";

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    desk: Arc<BookingDesk>,
    payments: Arc<MockPaymentProvider>,
    sms: Arc<RecordingSmsSender>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let payments = Arc::new(MockPaymentProvider::new("http://gondola.test"));
    let sms = Arc::new(RecordingSmsSender::new());
    let desk = Arc::new(BookingDesk::new(
        store.clone(),
        CheckoutOrchestrator::new(payments.clone(), "http://gondola.test").with_checkout_ttl(Duration::minutes(30)),
        Notifier::new(sms.clone()),
        1_000,
    ));

    let state = AppState {
        store: store.clone(),
        desk: desk.clone(),
        redis: None,
        auth: AuthConfig::default(),
        limits: ScheduleLimits::default(),
        default_currency: "EUR".to_string(),
    };

    Harness {
        app: app(state),
        store,
        desk,
        payments,
        sms,
    }
}

struct Reply {
    status: StatusCode,
    body: Value,
    cookie: Option<String>,
}

impl Harness {
    async fn send(&self, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        Reply { status, body, cookie }
    }

    async fn login(&self, role: &str, email: &str) -> String {
        let reply = self
            .send(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": PASSWORD, "role": role })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
        reply.cookie.expect("login sets a session cookie")
    }

    async fn passenger(&self, email: &str, phone: &str) -> String {
        let reply = self
            .send(
                "POST",
                "/api/auth/register/passenger",
                None,
                Some(json!({ "name": "Ada", "email": email, "phone": phone, "password": PASSWORD })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        self.login("passenger", email).await
    }

    async fn admin(&self) -> String {
        let email = "root@gondola.test";
        self.store
            .create_admin(email, &hash_password(PASSWORD).await.unwrap())
            .await
            .unwrap();
        self.login("admin", email).await
    }

    /// Registers a pilot and returns (pilot id, session cookie).
    async fn pilot(&self, email: &str) -> (String, String) {
        let reply = self
            .send(
                "POST",
                "/api/auth/register/pilot",
                None,
                Some(json!({
                    "name": "Joe",
                    "email": email,
                    "phone": "+15550002",
                    "password": PASSWORD,
                    "license_number": "CPL-1234",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        assert_eq!(reply.body["approved"], false);
        let id = reply.body["id"].as_str().unwrap().to_string();
        (id, self.login("pilot", email).await)
    }

    async fn approve_pilot(&self, admin: &str, pilot_id: &str) {
        let reply = self
            .send("POST", &format!("/api/admin/pilots/{}/approve", pilot_id), Some(admin), None)
            .await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    async fn publish_flight(&self, pilot: &str, price_cents: i64, max_passengers: i32) -> String {
        let reply = self
            .send(
                "POST",
                "/api/pilot/flights",
                Some(pilot),
                Some(flight_body(price_cents, max_passengers)),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.body["id"].as_str().unwrap().to_string()
    }

    /// Approved pilot with one published flight; returns (admin cookie, pilot cookie, flight id).
    async fn marketplace(&self, price_cents: i64, max_passengers: i32) -> (String, String, String) {
        let admin = self.admin().await;
        let (pilot_id, pilot) = self.pilot("joe@gondola.test").await;
        self.approve_pilot(&admin, &pilot_id).await;
        let flight_id = self.publish_flight(&pilot, price_cents, max_passengers).await;
        (admin, pilot, flight_id)
    }

    async fn book(&self, passenger: &str, flight_id: &str) -> Reply {
        self.send("POST", "/api/bookings", Some(passenger), Some(json!({ "flight_id": flight_id })))
            .await
    }

    async fn complete_checkout(&self, session_id: &str) -> Reply {
        self.send(
            "POST",
            "/api/webhooks/payments",
            None,
            Some(json!({
                "id": "evt_1",
                "type": "checkout.session.completed",
                "data": { "object": { "id": session_id } }
            })),
        )
        .await
    }
}

fn flight_body(price_cents: i64, max_passengers: i32) -> Value {
    json!({
        "title": "Sunrise over the valley",
        "description": "Champagne landing included",
        "launch_site": "Meadow field",
        "departure_time": Utc::now() + Duration::days(3),
        "duration_minutes": 90,
        "price_cents": price_cents,
        "max_passengers": max_passengers,
    })
}

#[tokio::test]
async fn test_register_login_me_logout() {
    let h = harness();
    let cookie = h.passenger("ada@gondola.test", "+15550001").await;
    assert!(cookie.starts_with("gondola_session="));

    let me = h.send("GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["role"], "passenger");
    assert_eq!(me.body["account"]["email"], "ada@gondola.test");
    assert!(me.body["account"].get("password_hash").is_none());

    let logout = h.send("POST", "/api/auth/logout", Some(&cookie), None).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);

    let after = h.send("GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let h = harness();
    h.passenger("ada@gondola.test", "+15550001").await;

    let again = h
        .send(
            "POST",
            "/api/auth/register/passenger",
            None,
            Some(json!({ "name": "Ada", "email": "ADA@gondola.test", "phone": "+1", "password": PASSWORD })),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_bad_credentials_are_unauthorized() {
    let h = harness();
    h.passenger("ada@gondola.test", "+15550001").await;

    let wrong_password = h
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ada@gondola.test", "password": "not-the-password", "role": "passenger" })),
        )
        .await;
    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert!(wrong_password.cookie.is_none());

    // right password, wrong role table
    let wrong_role = h
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ada@gondola.test", "password": PASSWORD, "role": "pilot" })),
        )
        .await;
    assert_eq!(wrong_role.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_fields_are_bad_request() {
    let h = harness();
    let reply = h
        .send("POST", "/api/auth/register/passenger", None, Some(json!({ "name": "Ada" })))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body["error"].is_string());

    let short = h
        .send(
            "POST",
            "/api/auth/register/passenger",
            None,
            Some(json!({ "name": "Ada", "email": "ada@gondola.test", "phone": "+1", "password": "short" })),
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_and_role_guards() {
    let h = harness();
    let no_session = h.send("GET", "/api/bookings", None, None).await;
    assert_eq!(no_session.status, StatusCode::UNAUTHORIZED);

    let forged = h
        .send("GET", "/api/bookings", Some("gondola_session=forged-token"), None)
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);

    let passenger = h.passenger("ada@gondola.test", "+15550001").await;
    let wrong_role = h.send("GET", "/api/pilot/flights", Some(&passenger), None).await;
    assert_eq!(wrong_role.status, StatusCode::FORBIDDEN);

    let admin_only = h.send("GET", "/api/admin/pilots", Some(&passenger), None).await;
    assert_eq!(admin_only.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unapproved_pilot_cannot_publish() {
    let h = harness();
    let admin = h.admin().await;
    let (pilot_id, pilot) = h.pilot("joe@gondola.test").await;

    let early = h
        .send("POST", "/api/pilot/flights", Some(&pilot), Some(flight_body(20_000, 4)))
        .await;
    assert_eq!(early.status, StatusCode::FORBIDDEN);

    h.approve_pilot(&admin, &pilot_id).await;
    let flight_id = h.publish_flight(&pilot, 20_000, 4).await;

    let public = h.send("GET", "/api/flights", None, None).await;
    assert_eq!(public.status, StatusCode::OK);
    let listed = public.body.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], flight_id.as_str());
    assert_eq!(listed[0]["seats_left"], 4);
    assert_eq!(listed[0]["currency"], "EUR");
}

#[tokio::test]
async fn test_invalid_flight_is_rejected() {
    let h = harness();
    let (_, pilot, _) = h.marketplace(20_000, 4).await;

    let mut body = flight_body(0, 40);
    body["departure_time"] = json!(Utc::now() - Duration::hours(1));
    let reply = h.send("POST", "/api/pilot/flights", Some(&pilot), Some(body)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let msg = reply.body["error"].as_str().unwrap();
    assert!(msg.contains("price"));
    assert!(msg.contains("max_passengers"));
}

#[tokio::test]
async fn test_booking_at_capacity_is_conflict() {
    let h = harness();
    let (_, _, flight_id) = h.marketplace(20_000, 1).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let bob = h.passenger("bob@gondola.test", "+15550003").await;

    let first = h.book(&ada, &flight_id).await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.body);
    assert_eq!(first.body["booking"]["status"], "pending");
    assert!(first.body["checkout_url"].as_str().unwrap().contains("mock-checkout"));

    let full = h.book(&bob, &flight_id).await;
    assert_eq!(full.status, StatusCode::CONFLICT);

    let twice = h.book(&ada, &flight_id).await;
    assert_eq!(twice.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_booking_unknown_flight_is_not_found() {
    let h = harness();
    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let reply = h.book(&ada, "00000000-0000-0000-0000-000000000000").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_confirms_and_notifies() {
    let h = harness();
    let (_, pilot, flight_id) = h.marketplace(20_000, 4).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;

    let booked = h.book(&ada, &flight_id).await;
    let session_id = booked.body["booking"]["checkout_session_id"].as_str().unwrap().to_string();

    let hook = h.complete_checkout(&session_id).await;
    assert_eq!(hook.status, StatusCode::OK);
    assert_eq!(hook.body["status"], "confirmed");

    let mine = h.send("GET", "/api/bookings", Some(&ada), None).await;
    let booking = &mine.body[0];
    assert_eq!(booking["status"], "confirmed");
    assert_eq!(booking["paid"], true);
    assert!(booking["payment_reference"].as_str().unwrap().starts_with("mock_pi_"));

    let recipients: Vec<String> = h.sms.sent().into_iter().map(|(to, _)| to).collect();
    assert_eq!(recipients, vec!["+15550001".to_string(), "+15550002".to_string()]);

    // redelivery changes nothing and sends nothing
    let again = h.complete_checkout(&session_id).await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(h.sms.sent().len(), 2);

    let pilot_view = h.send("GET", "/api/pilot/bookings", Some(&pilot), None).await;
    assert_eq!(pilot_view.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_webhook_events_are_acknowledged() {
    let h = harness();
    let other_type = h
        .send(
            "POST",
            "/api/webhooks/payments",
            None,
            Some(json!({ "type": "customer.created", "data": { "object": { "id": "cus_1" } } })),
        )
        .await;
    assert_eq!(other_type.status, StatusCode::OK);

    let unknown_session = h.complete_checkout("cs_does_not_exist").await;
    assert_eq!(unknown_session.status, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_checkout_frees_the_seat() {
    let h = harness();
    let (_, _, flight_id) = h.marketplace(20_000, 1).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let bob = h.passenger("bob@gondola.test", "+15550003").await;

    let booked = h.book(&ada, &flight_id).await;
    let session_id = booked.body["booking"]["checkout_session_id"].as_str().unwrap().to_string();
    h.payments.expire(&session_id);

    let hook = h
        .send(
            "POST",
            "/api/webhooks/payments",
            None,
            Some(json!({ "type": "checkout.session.expired", "data": { "object": { "id": session_id } } })),
        )
        .await;
    assert_eq!(hook.body["status"], "canceled");

    assert_eq!(h.book(&bob, &flight_id).await.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_settings_update_changes_fee_at_checkout() {
    let h = harness();
    let (admin, _, flight_id) = h.marketplace(10_000, 4).await;

    let invalid = h
        .send("PUT", "/api/admin/settings", Some(&admin), Some(json!({ "fee_bps": 10_001 })))
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

    let saved = h
        .send("PUT", "/api/admin/settings", Some(&admin), Some(json!({ "fee_bps": 2_500 })))
        .await;
    assert_eq!(saved.status, StatusCode::OK);
    assert_eq!(saved.body["fee_bps"], 2_500);

    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let booked = h.book(&ada, &flight_id).await;
    assert_eq!(booked.body["booking"]["amount_cents"], 10_000);
    assert_eq!(booked.body["booking"]["platform_fee_cents"], 2_500);
    assert_eq!(booked.body["booking"]["pilot_payout_cents"], 7_500);

    let requests = h.payments.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].platform_fee_cents, 2_500);
    // no payout account yet, so no transfer
    assert!(requests[0].destination_account.is_none());
    // the provider closes the checkout when the hold runs out
    assert!(requests[0].expires_at.unwrap() > Utc::now() + Duration::minutes(29));
}

#[tokio::test]
async fn test_payout_account_becomes_transfer_destination() {
    let h = harness();
    let (_, pilot, flight_id) = h.marketplace(10_000, 4).await;

    let profile = h
        .send(
            "PUT",
            "/api/pilot/profile",
            Some(&pilot),
            Some(json!({ "payout_account_id": "acct_joe" })),
        )
        .await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.body["payout_account_id"], "acct_joe");

    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    h.book(&ada, &flight_id).await;
    assert_eq!(h.payments.requests()[0].destination_account.as_deref(), Some("acct_joe"));
}

#[tokio::test]
async fn test_blocked_pilot_cannot_log_in() {
    let h = harness();
    let admin = h.admin().await;
    let (pilot_id, pilot) = h.pilot("joe@gondola.test").await;

    let blocked = h
        .send("POST", &format!("/api/admin/pilots/{}/block", pilot_id), Some(&admin), None)
        .await;
    assert_eq!(blocked.status, StatusCode::OK);
    assert_eq!(blocked.body["blocked"], true);

    let old_session = h.send("GET", "/api/auth/me", Some(&pilot), None).await;
    assert_eq!(old_session.status, StatusCode::UNAUTHORIZED);

    let login = h
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "joe@gondola.test", "password": PASSWORD, "role": "pilot" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::FORBIDDEN);

    h.send("POST", &format!("/api/admin/pilots/{}/unblock", pilot_id), Some(&admin), None)
        .await;
    h.login("pilot", "joe@gondola.test").await;
}

#[tokio::test]
async fn test_passenger_cancel_refunds_confirmed_booking() {
    let h = harness();
    let (_, _, flight_id) = h.marketplace(20_000, 4).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let bob = h.passenger("bob@gondola.test", "+15550003").await;

    let booked = h.book(&ada, &flight_id).await;
    let booking_id = booked.body["booking"]["id"].as_str().unwrap().to_string();
    let session_id = booked.body["booking"]["checkout_session_id"].as_str().unwrap().to_string();
    h.complete_checkout(&session_id).await;

    // not Bob's booking
    let foreign = h
        .send("POST", &format!("/api/bookings/{}/cancel", booking_id), Some(&bob), None)
        .await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);

    let canceled = h
        .send("POST", &format!("/api/bookings/{}/cancel", booking_id), Some(&ada), None)
        .await;
    assert_eq!(canceled.status, StatusCode::OK);
    assert_eq!(canceled.body["booking"]["status"], "canceled");
    assert_eq!(canceled.body["refunded"], true);
    assert_eq!(h.payments.refunds().len(), 1);

    let again = h
        .send("POST", &format!("/api/bookings/{}/cancel", booking_id), Some(&ada), None)
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    // a late duplicate webhook must not refund twice
    h.complete_checkout(&session_id).await;
    assert_eq!(h.payments.refunds().len(), 1);
}

#[tokio::test]
async fn test_pilot_cancels_flight() {
    let h = harness();
    let (_, pilot, flight_id) = h.marketplace(20_000, 4).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let bob = h.passenger("bob@gondola.test", "+15550003").await;

    let paid = h.book(&ada, &flight_id).await;
    h.complete_checkout(paid.body["booking"]["checkout_session_id"].as_str().unwrap())
        .await;
    h.book(&bob, &flight_id).await;

    let reply = h
        .send("POST", &format!("/api/pilot/flights/{}/cancel", flight_id), Some(&pilot), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["flight"]["status"], "canceled");
    let outcomes = reply.body["canceled_bookings"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes.iter().filter(|o| o["refunded"] == true).count(), 1);

    let texts: Vec<(String, String)> = h.sms.sent();
    assert!(texts.iter().any(|(to, body)| to == "+15550003" && body.contains("canceled")));

    let edit = h
        .send(
            "PATCH",
            &format!("/api/pilot/flights/{}", flight_id),
            Some(&pilot),
            Some(json!({ "title": "Renamed" })),
        )
        .await;
    assert_eq!(edit.status, StatusCode::CONFLICT);

    let public = h.send("GET", "/api/flights", None, None).await;
    assert!(public.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_capacity_cannot_drop_below_bookings() {
    let h = harness();
    let (_, pilot, flight_id) = h.marketplace(20_000, 3).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let bob = h.passenger("bob@gondola.test", "+15550003").await;
    h.book(&ada, &flight_id).await;
    h.book(&bob, &flight_id).await;

    let uri = format!("/api/pilot/flights/{}", flight_id);
    let shrink = h
        .send("PATCH", &uri, Some(&pilot), Some(json!({ "max_passengers": 1 })))
        .await;
    assert_eq!(shrink.status, StatusCode::CONFLICT);

    let ok = h
        .send("PATCH", &uri, Some(&pilot), Some(json!({ "max_passengers": 2 })))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["max_passengers"], 2);
}

#[tokio::test]
async fn test_sweep_releases_stale_pending_bookings() {
    let h = harness();
    let (_, _, flight_id) = h.marketplace(20_000, 1).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let bob = h.passenger("bob@gondola.test", "+15550003").await;

    let booked = h.book(&ada, &flight_id).await;
    h.payments.keep_open(booked.body["booking"]["checkout_session_id"].as_str().unwrap());
    assert_eq!(h.book(&bob, &flight_id).await.status, StatusCode::CONFLICT);

    // a negative hold makes every pending booking stale
    run_sweep(&h.desk, h.store.as_ref(), Duration::minutes(-1)).await;

    let mine = h.send("GET", "/api/bookings", Some(&ada), None).await;
    assert_eq!(mine.body[0]["status"], "canceled");
    assert_eq!(h.book(&bob, &flight_id).await.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_sweep_confirms_payment_whose_webhook_is_missing() {
    let h = harness();
    let (_, _, flight_id) = h.marketplace(20_000, 1).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;

    // paid at the provider, webhook never delivered
    h.book(&ada, &flight_id).await;
    run_sweep(&h.desk, h.store.as_ref(), Duration::minutes(-1)).await;

    let mine = h.send("GET", "/api/bookings", Some(&ada), None).await;
    assert_eq!(mine.body[0]["status"], "confirmed");
    assert_eq!(mine.body[0]["paid"], true);
    assert!(h.payments.refunds().is_empty());
    assert_eq!(h.sms.sent().len(), 2);
}

#[tokio::test]
async fn test_late_payment_on_canceled_booking_is_refunded_once() {
    let h = harness();
    let (_, _, flight_id) = h.marketplace(20_000, 4).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;

    let booked = h.book(&ada, &flight_id).await;
    let booking_id = booked.body["booking"]["id"].as_str().unwrap().to_string();
    let session_id = booked.body["booking"]["checkout_session_id"].as_str().unwrap().to_string();

    let canceled = h
        .send("POST", &format!("/api/bookings/{}/cancel", booking_id), Some(&ada), None)
        .await;
    assert_eq!(canceled.body["refunded"], false);

    // the payment still goes through and the provider redelivers the event
    for _ in 0..3 {
        let hook = h.complete_checkout(&session_id).await;
        assert_eq!(hook.status, StatusCode::OK);
        assert_eq!(hook.body["status"], "canceled");
    }
    assert_eq!(h.payments.refunds().len(), 1);

    let booking = h
        .send("GET", &format!("/api/bookings/{}", booking_id), Some(&ada), None)
        .await;
    assert_eq!(booking.body["status"], "canceled");
    assert_eq!(booking.body["paid"], true);
    assert!(booking.body["payment_reference"].as_str().unwrap().starts_with("mock_pi_"));
}

#[tokio::test]
async fn test_failed_checkout_frees_the_seat() {
    let h = harness();
    let (_, _, flight_id) = h.marketplace(20_000, 1).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let bob = h.passenger("bob@gondola.test", "+15550003").await;

    h.payments.fail_next_checkout();
    let failed = h.book(&ada, &flight_id).await;
    assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failed.body["error"], "Internal Server Error");

    assert_eq!(h.book(&bob, &flight_id).await.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_same_passenger_cannot_book_twice() {
    let h = harness();
    let (_, _, flight_id) = h.marketplace(20_000, 4).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;

    assert_eq!(h.book(&ada, &flight_id).await.status, StatusCode::CREATED);
    assert_eq!(h.book(&ada, &flight_id).await.status, StatusCode::CONFLICT);

    let flight = h.send("GET", &format!("/api/flights/{}", flight_id), None, None).await;
    assert_eq!(flight.body["seats_booked"], 1);
}

#[tokio::test]
async fn test_pilot_cannot_cancel_booking_on_another_flight() {
    let h = harness();
    let (admin, _, flight_id) = h.marketplace(20_000, 4).await;
    let (kim_id, kim) = h.pilot("kim@gondola.test").await;
    h.approve_pilot(&admin, &kim_id).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;

    let booked = h.book(&ada, &flight_id).await;
    let booking_id = booked.body["booking"]["id"].as_str().unwrap().to_string();

    let reply = h
        .send("POST", &format!("/api/pilot/bookings/{}/cancel", booking_id), Some(&kim), None)
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let mine = h.send("GET", "/api/bookings", Some(&ada), None).await;
    assert_eq!(mine.body[0]["status"], "pending");
}

#[tokio::test]
async fn test_admin_cancels_any_booking() {
    let h = harness();
    let (admin, _, flight_id) = h.marketplace(20_000, 4).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;

    let booked = h.book(&ada, &flight_id).await;
    let booking_id = booked.body["booking"]["id"].as_str().unwrap().to_string();
    h.complete_checkout(booked.body["booking"]["checkout_session_id"].as_str().unwrap())
        .await;

    let all = h.send("GET", "/api/admin/bookings", Some(&admin), None).await;
    assert_eq!(all.body.as_array().unwrap().len(), 1);

    let reply = h
        .send("POST", &format!("/api/admin/bookings/{}/cancel", booking_id), Some(&admin), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["booking"]["status"], "canceled");
    assert_eq!(reply.body["refunded"], true);

    let texts = h.sms.sent();
    let (to, body) = texts.last().unwrap();
    assert_eq!(to, "+15550001");
    assert!(body.contains("refunded"));
}

#[tokio::test]
async fn test_interrupted_flight_cancellation_can_be_finished() {
    let h = harness();
    let (_, pilot, flight_id) = h.marketplace(20_000, 4).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;

    let paid = h.book(&ada, &flight_id).await;
    h.complete_checkout(paid.body["booking"]["checkout_session_id"].as_str().unwrap())
        .await;

    // flight marked canceled, bookings left behind
    let id = flight_id.parse().unwrap();
    h.store.set_flight_status(id, FlightStatus::Canceled).await.unwrap();

    let uri = format!("/api/pilot/flights/{}/cancel", flight_id);
    let resumed = h.send("POST", &uri, Some(&pilot), None).await;
    assert_eq!(resumed.status, StatusCode::OK);
    let outcomes = resumed.body["canceled_bookings"].as_array().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0]["refunded"], true);

    let again = h.send("POST", &uri, Some(&pilot), None).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(h.payments.refunds().len(), 1);
}

#[tokio::test]
async fn test_meister_directory_requires_approval() {
    let h = harness();
    let (admin, _, _) = h.marketplace(20_000, 4).await;

    let registered = h
        .send(
            "POST",
            "/api/auth/register/meister",
            None,
            Some(json!({
                "name": "Greta",
                "email": "greta@fiesta.test",
                "phone": "+15550009",
                "password": PASSWORD,
                "organization": "Valley Balloon Fiesta",
            })),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);
    let meister_id = registered.body["id"].as_str().unwrap().to_string();
    let meister = h.login("meister", "greta@fiesta.test").await;

    let early = h.send("GET", "/api/meister/pilots", Some(&meister), None).await;
    assert_eq!(early.status, StatusCode::FORBIDDEN);

    h.send("POST", &format!("/api/admin/meisters/{}/approve", meister_id), Some(&admin), None)
        .await;
    let directory = h.send("GET", "/api/meister/pilots", Some(&meister), None).await;
    assert_eq!(directory.status, StatusCode::OK);
    let pilots = directory.body.as_array().unwrap();
    assert_eq!(pilots.len(), 1);
    assert_eq!(pilots[0]["name"], "Joe");
    assert!(pilots[0].get("payout_account_id").is_none());
}

#[tokio::test]
async fn test_payout_report_counts_confirmed_bookings_only() {
    let h = harness();
    let (admin, pilot, flight_id) = h.marketplace(10_000, 4).await;
    let ada = h.passenger("ada@gondola.test", "+15550001").await;
    let bob = h.passenger("bob@gondola.test", "+15550003").await;

    let paid = h.book(&ada, &flight_id).await;
    h.complete_checkout(paid.body["booking"]["checkout_session_id"].as_str().unwrap())
        .await;
    h.book(&bob, &flight_id).await;

    let report = h.send("GET", "/api/admin/payouts", Some(&admin), None).await;
    assert_eq!(report.status, StatusCode::OK);
    let rows = report.body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["confirmed_bookings"], 1);
    assert_eq!(rows[0]["gross_cents"], 10_000);
    assert_eq!(rows[0]["platform_fee_cents"], 1_000);
    assert_eq!(rows[0]["pilot_payout_cents"], 9_000);

    let own = h.send("GET", "/api/pilot/payouts", Some(&pilot), None).await;
    assert_eq!(own.body, report.body);
}
