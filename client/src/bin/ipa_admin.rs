//! Administer IPA users and roles from the command line.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io;

use clap::{Parser, Subcommand};
use ipa_client::{
    ClientError, HttpSessionTransport, IdentityService, IpaSettings, Page, Role, User,
};
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

/// `ipa-admin` command arguments.
///
/// Connection settings come from `IPA_*` environment variables and
/// configuration files.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ipa-admin",
    about = "Inspect and administer IPA users and roles over a session",
    version
)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List one page of users.
    Users {
        #[arg(long, default_value_t = 20, allow_negative_numbers = true)]
        limit: i64,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
    },
    /// Show one user.
    User { uid: String },
    /// List one page of roles.
    Roles {
        #[arg(long, default_value_t = 20, allow_negative_numbers = true)]
        limit: i64,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
    },
    /// Show one role.
    Role { name: String },
    /// Report whether a role exists.
    HasRole { name: String },
    /// Grant a role to a user, or revoke it when already granted.
    ToggleRole { role: String, uid: String },
    /// Print the maximum password lifetime in days.
    Pwpolicy,
}

fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| io::Error::other(format!("create Tokio runtime: {error}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let args = CliArgs::try_parse().map_err(io::Error::other)?;
    let settings = IpaSettings::load_from_iter([OsString::from("ipa-admin")])
        .map_err(|error| io::Error::other(format!("load IPA settings: {error}")))?;

    let endpoints = settings
        .endpoints()
        .map_err(client_error("resolve endpoints"))?;
    let transport = HttpSessionTransport::new(endpoints, settings.timeout())
        .map_err(|error| io::Error::other(format!("build HTTP client: {error}")))?;
    let mut service = IdentityService::with_api_version(transport, settings.api_version());

    let user = settings.user.as_deref().unwrap_or_default();
    let password = settings.password.as_deref().unwrap_or_default();
    service
        .login(user, password)
        .await
        .map_err(client_error("login"))?;

    let outcome = run(&service, args.command).await;

    if let Err(error) = service.logout().await {
        warn!(error = %error, "ipa logout failed");
    }
    service.close();
    outcome.map_err(client_error("command failed"))
}

async fn run(
    service: &IdentityService<HttpSessionTransport>,
    command: Command,
) -> Result<(), ClientError> {
    match command {
        Command::Users { limit, offset } => {
            print_page(&service.users(limit, offset).await?, user_line);
        }
        Command::User { uid } => println!("{}", user_line(&service.user(&uid).await?)),
        Command::Roles { limit, offset } => {
            print_page(&service.roles(limit, offset).await?, role_line);
        }
        Command::Role { name } => println!("{}", role_line(&service.role(&name).await?)),
        Command::HasRole { name } => {
            println!("role={name} exists={}", service.has_role(&name).await?);
        }
        Command::ToggleRole { role, uid } => {
            service.toggle_role_for_user(&role, &uid).await?;
            let granted = service.user(&uid).await?.has_role(&role);
            println!("role={role} uid={uid} granted={granted}");
        }
        Command::Pwpolicy => println!("krbmaxpwdlife={}", service.krb_max_pwd_life().await?),
    }
    Ok(())
}

fn print_page<T>(page: &Page<T>, line: fn(&T) -> String) {
    for item in page.items() {
        println!("{}", line(item));
    }
    println!(
        "total={} offset={} limit={} more={}",
        page.total(),
        page.window().offset(),
        page.window().limit(),
        page.has_more()
    );
}

fn user_line(user: &User) -> String {
    let expires = user
        .password_expiration
        .map(|at| at.to_rfc3339())
        .unwrap_or_default();
    format!(
        "uid={} name={} mail={} locked={} roles={} password_expiration={}",
        user.uid,
        user.common_name,
        user.mail,
        user.account_locked,
        user.member_of_roles.join(","),
        expires
    )
}

fn role_line(role: &Role) -> String {
    format!(
        "role={} description={} members={}",
        role.cn,
        role.description,
        role.member_users.join(",")
    )
}

fn client_error(context: &'static str) -> impl Fn(ClientError) -> io::Error {
    move |error| io::Error::other(format!("{context}: {error}"))
}
