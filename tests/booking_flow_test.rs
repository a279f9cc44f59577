mod common;

use common::{seed_session, seed_session_type, seed_trainer, TestApp};
use matchable_api::{
    entities::{booking, session, BookingStatus, SessionStatus},
    errors::ServiceError,
    services::bookings::CreateBookingInput,
};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};

fn booking_input(sessions: Vec<i32>) -> CreateBookingInput {
    CreateBookingInput {
        client_name: "Jamie Doe".to_string(),
        client_email: "jamie@example.com".to_string(),
        client_phone: "5551234567".to_string(),
        sessions,
        terms_accepted: true,
        special_requests: None,
    }
}

#[tokio::test]
async fn booking_two_sessions_accumulates_total_and_capacity() {
    let app = TestApp::new().await;
    let trainer = seed_trainer(&app, "Ana Costa").await;
    let session_type = seed_session_type(&app, "padel").await;
    let first = seed_session(&app, session_type.id, trainer.id, dec!(50.00), 4).await;
    let second = seed_session(&app, session_type.id, trainer.id, dec!(30.00), 4).await;

    let details = app
        .state
        .services
        .bookings
        .create_booking(booking_input(vec![first.id, second.id]))
        .await
        .expect("booking should succeed");

    assert_eq!(details.total_amount, dec!(80.00));
    assert_eq!(details.booking_status, BookingStatus::Pending);
    assert_eq!(details.payment_status, "pending");
    assert_eq!(details.sessions.len(), 2);
    assert!(details.booking_number.starts_with("MTB-"));

    for id in [first.id, second.id] {
        let s = session::Entity::find_by_id(id)
            .one(app.db())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.current_participants, 1);
        assert_eq!(s.status, SessionStatus::Available);
    }
}

#[tokio::test]
async fn booking_last_spot_flips_session_to_booked() {
    let app = TestApp::new().await;
    let trainer = seed_trainer(&app, "Ana Costa").await;
    let session_type = seed_session_type(&app, "padel").await;
    let single = seed_session(&app, session_type.id, trainer.id, dec!(50.00), 1).await;

    app.state
        .services
        .bookings
        .create_booking(booking_input(vec![single.id]))
        .await
        .expect("first booking should succeed");

    let s = session::Entity::find_by_id(single.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(s.current_participants, 1);
    assert_eq!(s.status, SessionStatus::Booked);

    // No longer bookable
    let err = app
        .state
        .services
        .bookings
        .create_booking(booking_input(vec![single.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn failed_booking_leaves_no_partial_state() {
    let app = TestApp::new().await;
    let trainer = seed_trainer(&app, "Ana Costa").await;
    let session_type = seed_session_type(&app, "padel").await;
    let open = seed_session(&app, session_type.id, trainer.id, dec!(50.00), 4).await;

    let err = app
        .state
        .services
        .bookings
        .create_booking(booking_input(vec![open.id, 99_999]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    // All-or-nothing: no booking rows, no capacity consumed
    let bookings = booking::Entity::find().count(app.db()).await.unwrap();
    assert_eq!(bookings, 0);

    let s = session::Entity::find_by_id(open.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(s.current_participants, 0);
}

#[tokio::test]
async fn cancel_restores_exactly_the_consumed_capacity() {
    let app = TestApp::new().await;
    let trainer = seed_trainer(&app, "Ana Costa").await;
    let session_type = seed_session_type(&app, "padel").await;
    let single = seed_session(&app, session_type.id, trainer.id, dec!(50.00), 1).await;

    let details = app
        .state
        .services
        .bookings
        .create_booking(booking_input(vec![single.id]))
        .await
        .unwrap();

    app.state
        .services
        .bookings
        .cancel_booking(&details.booking_number)
        .await
        .expect("cancel should succeed");

    let s = session::Entity::find_by_id(single.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(s.current_participants, 0);
    assert_eq!(s.status, SessionStatus::Available);

    let cancelled = app
        .state
        .services
        .bookings
        .get_booking(&details.booking_number)
        .await
        .unwrap();
    assert_eq!(cancelled.booking_status, BookingStatus::Cancelled);

    // Cancel-then-rebook must succeed when nothing changed in between
    app.state
        .services
        .bookings
        .create_booking(booking_input(vec![single.id]))
        .await
        .expect("re-booking the freed spot should succeed");
}

#[tokio::test]
async fn second_cancel_is_rejected() {
    let app = TestApp::new().await;
    let trainer = seed_trainer(&app, "Ana Costa").await;
    let session_type = seed_session_type(&app, "padel").await;
    let s = seed_session(&app, session_type.id, trainer.id, dec!(50.00), 2).await;

    let details = app
        .state
        .services
        .bookings
        .create_booking(booking_input(vec![s.id]))
        .await
        .unwrap();

    app.state
        .services
        .bookings
        .cancel_booking(&details.booking_number)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .bookings
        .cancel_booking(&details.booking_number)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    // The second attempt must not decrement anything further
    let after = session::Entity::find_by_id(s.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.current_participants, 0);
}

#[tokio::test]
async fn validation_runs_before_any_write() {
    let app = TestApp::new().await;

    let mut input = booking_input(vec![1]);
    input.terms_accepted = false;
    let err = app
        .state
        .services
        .bookings
        .create_booking(input)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let empty = booking_input(vec![]);
    let err = app
        .state
        .services
        .bookings
        .create_booking(empty)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let mut bad_email = booking_input(vec![1]);
    bad_email.client_email = "not-an-email".to_string();
    let err = app
        .state
        .services
        .bookings
        .create_booking(bad_email)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidFields(_)));

    assert_eq!(booking::Entity::find().count(app.db()).await.unwrap(), 0);
}
