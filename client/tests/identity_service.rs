//! Integration tests for the identity service against the in-memory server.
//!
//! These cover the end-to-end behaviour of listing windows, user and role
//! lifecycles, batch atomicity, and session handling through the public API.
#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clear failure messages"
)]

use chrono::{TimeZone, Utc};
use ipa_client::test_support::FakeIpaServer;
use ipa_client::{ClientError, IdentityService, RequestUser};
use rstest::{fixture, rstest};

const ADMIN: &str = "admin";
const SECRET: &str = "Secret123";

#[fixture]
fn server() -> FakeIpaServer {
    let mut server = FakeIpaServer::new(ADMIN, SECRET)
        .with_role("helpdesk", "Help desk operators")
        .with_role("auditor", "Read-only auditors")
        .with_max_password_life("90");
    for index in 0..25 {
        let uid = format!("user{index:02}");
        server = server.with_user(&uid, "Test", &format!("User {index}"));
    }
    server.with_user(ADMIN, "Administrator", "Account")
}

async fn logged_in(server: &FakeIpaServer) -> IdentityService<FakeIpaServer> {
    let mut service = IdentityService::new(server.clone());
    service.login(ADMIN, SECRET).await.expect("login succeeds");
    service
}

#[rstest]
#[tokio::test]
async fn default_window_returns_first_twenty_users(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    let page = service.users(0, 0).await.expect("listing succeeds");

    assert_eq!(page.items().len(), 20);
    assert_eq!(page.total(), 26);
    assert!(page.has_more());
    assert_eq!(page.items()[0].uid, ADMIN);
}

#[rstest]
#[tokio::test]
async fn oversized_window_is_clamped(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    let users = service.users(i64::MAX, -1).await.expect("listing succeeds");
    let roles = service.roles(i64::MAX, -1).await.expect("listing succeeds");

    assert!(users.items().len() <= 20);
    assert_eq!(roles.items().len(), 2);
    assert_eq!(roles.total(), 2);
}

#[rstest]
#[tokio::test]
async fn window_past_the_end_is_empty(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    let page = service.users(5, 100).await.expect("listing succeeds");

    assert!(page.items().is_empty());
    assert_eq!(page.total(), 26);
    assert_eq!(
        server.methods().last().map(String::as_str),
        Some("user_find")
    );
}

#[rstest]
#[tokio::test]
async fn created_user_reads_back(server: FakeIpaServer) {
    let service = logged_in(&server).await;
    let expires = Utc
        .with_ymd_and_hms(2031, 1, 15, 8, 30, 0)
        .single()
        .expect("valid timestamp");
    let request = RequestUser::new("jdoe")
        .with_names("John", "Doe")
        .with_mail("jdoe@example.test")
        .with_password_expiration(expires);

    let created = service.create_user(&request).await.expect("create succeeds");
    let fetched = service.user("jdoe").await.expect("user exists");

    assert_eq!(created, fetched);
    assert_eq!(fetched.given_name, "John");
    assert_eq!(fetched.surname, "Doe");
    assert_eq!(fetched.common_name, "John Doe");
    assert_eq!(fetched.mail, "jdoe@example.test");
    assert_eq!(fetched.password_expiration, Some(expires));
    assert!(!fetched.account_locked);
}

#[rstest]
#[tokio::test]
async fn empty_value_clears_attribute(server: FakeIpaServer) {
    let service = logged_in(&server).await;
    let request = RequestUser::new("jdoe")
        .with_names("John", "Doe")
        .with_mail("jdoe@example.test");
    service.create_user(&request).await.expect("create succeeds");

    service
        .update_user(&RequestUser::new("jdoe").with_mail(""))
        .await
        .expect("clearing update succeeds");

    let fetched = service.user("jdoe").await.expect("user exists");
    assert_eq!(fetched.mail, "");
    assert_eq!(fetched.given_name, "John");
}

#[rstest]
#[tokio::test]
async fn duplicate_create_is_rejected(server: FakeIpaServer) {
    let service = logged_in(&server).await;
    let request = RequestUser::new("user01").with_names("Test", "Again");

    let err = service
        .create_user(&request)
        .await
        .expect_err("duplicate rejected");

    assert!(matches!(err, ClientError::Rpc { code: 4002, .. }));
    assert_eq!(server.user_count(), 26);
}

#[rstest]
#[tokio::test]
async fn missing_expiration_decodes_to_none(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    let user = service.user("user03").await.expect("user exists");

    assert_eq!(user.password_expiration, None);
    assert_eq!(user.dn, "uid=user03,cn=users,cn=accounts,dc=example,dc=test");
}

#[rstest]
#[tokio::test]
async fn repeating_an_update_succeeds(server: FakeIpaServer) {
    let service = logged_in(&server).await;
    let request = RequestUser::new("user04").with_mail("user04@example.test");

    service.update_user(&request).await.expect("first update");
    service.update_user(&request).await.expect("no-op update");

    let user = service.user("user04").await.expect("user exists");
    assert_eq!(user.mail, "user04@example.test");
}

#[rstest]
#[tokio::test]
async fn locking_an_account_round_trips(server: FakeIpaServer) {
    let service = logged_in(&server).await;
    let request = RequestUser::new("user05").with_account_locked(true);

    service.update_user(&request).await.expect("update succeeds");

    assert!(service.user("user05").await.expect("user exists").account_locked);
}

#[rstest]
#[tokio::test]
async fn deleting_a_missing_user_is_not_found(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    service.delete_user("user06").await.expect("delete succeeds");
    let err = service.delete_user("user06").await.expect_err("already gone");

    assert!(err.is_not_found());
    assert_eq!(err.http_status(), Some(404));
}

#[rstest]
#[tokio::test]
async fn toggling_twice_restores_membership(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    service
        .toggle_role_for_user("helpdesk", "user07")
        .await
        .expect("grant");
    let granted = service.user("user07").await.expect("user exists");
    service
        .toggle_role_for_user("helpdesk", "user07")
        .await
        .expect("revoke");
    let revoked = service.user("user07").await.expect("user exists");

    assert!(granted.has_role("helpdesk"));
    assert!(!revoked.has_role("helpdesk"));
}

#[rstest]
#[tokio::test]
async fn toggle_for_missing_user_is_not_found(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    let err = service
        .toggle_role_for_user("helpdesk", "ghost")
        .await
        .expect_err("user missing");

    assert!(err.is_not_found());
}

#[rstest]
#[tokio::test]
async fn batch_lookup_is_all_or_nothing(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    let roles = service
        .roles_by_name(&["auditor", "helpdesk"])
        .await
        .expect("both roles exist");
    let err = service
        .roles_by_name(&["auditor", "ghost", "helpdesk"])
        .await
        .expect_err("one role missing");

    let names: Vec<&str> = roles.iter().map(|role| role.cn.as_str()).collect();
    assert_eq!(names, ["auditor", "helpdesk"]);
    let ClientError::Batch { failures } = err else {
        panic!("expected batch error, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("ghost"));
}

#[rstest]
#[tokio::test]
async fn role_lifecycle(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    let created = service
        .create_role("operators", Some("Night shift"))
        .await
        .expect("create succeeds");
    assert!(service.has_role("operators").await.expect("lookup succeeds"));

    service
        .update_role("operators", "Day shift")
        .await
        .expect("update succeeds");
    service
        .update_role("operators", "Day shift")
        .await
        .expect("no-op update succeeds");
    let updated = service.role("operators").await.expect("role exists");

    service.delete_role("operators").await.expect("delete succeeds");

    assert_eq!(created.description, "Night shift");
    assert_eq!(updated.description, "Day shift");
    assert!(!service.has_role("operators").await.expect("lookup succeeds"));
}

#[rstest]
#[tokio::test]
async fn password_policy_is_read(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    assert_eq!(service.krb_max_pwd_life().await, Ok(90));
}

#[rstest]
#[tokio::test]
async fn invalid_login_leaves_no_session(server: FakeIpaServer) {
    let mut service = IdentityService::new(server.clone());

    let err = service
        .login(ADMIN, "wrong")
        .await
        .expect_err("login rejected");
    let follow_up = service.users(0, 0).await.expect_err("no session");

    assert_eq!(err, ClientError::Unauthorized { status: 401 });
    assert_eq!(follow_up, ClientError::Unauthorized { status: 401 });
}

#[rstest]
#[tokio::test]
async fn logout_ends_the_session(server: FakeIpaServer) {
    let mut service = logged_in(&server).await;

    service.logout().await.expect("logout succeeds");

    assert!(!server.is_logged_in());
    let err = service.role("helpdesk").await.expect_err("session ended");
    assert_eq!(err.http_status(), Some(401));
}

#[rstest]
#[tokio::test]
async fn closed_service_reports_transport_error(server: FakeIpaServer) {
    let mut service = logged_in(&server).await;

    service.close();
    service.close();

    let err = service.user(ADMIN).await.expect_err("transport closed");
    assert!(matches!(err, ClientError::Transport { timeout: false, .. }));
}

#[rstest]
#[tokio::test]
async fn concurrent_reads_share_one_session(server: FakeIpaServer) {
    let service = logged_in(&server).await;

    let (users, roles, policy) = tokio::join!(
        service.users(3, 0),
        service.roles(1, 1),
        service.krb_max_pwd_life()
    );

    assert_eq!(users.expect("users").items().len(), 3);
    assert_eq!(roles.expect("roles").items()[0].cn, "helpdesk");
    assert_eq!(policy, Ok(90));
}
