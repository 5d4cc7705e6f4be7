//! Python virtual environments under the login user's home

use super::pip::{PackageSpec, Pip};
use rolekit::{Capability, Context, Executor, RemoteFs, Result, Role, ensure, keys, quote};
use serde::{Deserialize, Serialize};

/// An environment to create on provision, with the packages it holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSpec {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<PackageSpec>,
}

/// Manages virtualenvs in `~<user>/.virtualenvs`.
///
/// The user comes from the context [`keys::USER`] value.
#[derive(Debug, Default)]
pub struct Virtualenv {
    envs: Vec<EnvSpec>,
}

impl Virtualenv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_envs(mut self, envs: Vec<EnvSpec>) -> Self {
        self.envs = envs;
        self
    }

    /// Directory holding every environment of the context user
    pub fn base_directory(&self, ctx: &Context) -> Result<String> {
        let user = ctx.require_str(keys::USER)?;
        Ok(if user == "root" {
            "/root/.virtualenvs".to_string()
        } else {
            format!("/home/{user}/.virtualenvs")
        })
    }

    pub fn env_dir(&self, ctx: &Context, name: &str) -> Result<String> {
        Ok(format!("{}/{name}", self.base_directory(ctx)?))
    }

    pub fn env_exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        ctx.remote_dir_exists(&self.env_dir(ctx, name)?)
    }

    /// Create the environment and return its directory
    pub fn create_env(&self, ctx: &Context, name: &str) -> Result<String> {
        let dir = self.env_dir(ctx, name)?;
        log::info!("Creating virtualenv {dir}");
        ctx.execute(&format!("virtualenv {}", quote(&dir)), false, false)?;
        Ok(dir)
    }

    /// Create the environment unless it exists; `true` when created
    pub fn ensure_env(&self, ctx: &Context, name: &str) -> Result<bool> {
        ensure(
            || self.env_exists(ctx, name),
            || self.create_env(ctx, name).map(|_| ()),
        )
    }

    /// Run `f` with the environment activated for every command it issues.
    ///
    /// The environment is created first when missing.
    pub fn within_env<T>(&self, ctx: &Context, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.ensure_env(ctx, name)?;
        let activate = format!(". {}/bin/activate", quote(&self.env_dir(ctx, name)?));
        ctx.with_prefix(activate, f)
    }
}

impl Role for Virtualenv {
    fn name(&self) -> &'static str {
        "virtualenv"
    }

    fn provision(&mut self, ctx: &Context) -> Result<()> {
        ctx.using(|pip: &mut Pip| {
            pip.ensure_package_installed(ctx, "virtualenv", None)?;
            pip.ensure_package_installed(ctx, "virtualenvwrapper", None)?;
            Ok(())
        })?;

        for env in &self.envs {
            self.within_env(ctx, &env.name, || {
                ctx.using(|pip: &mut Pip| {
                    let use_sudo = pip.uses_sudo();
                    pip.set_sudo(false);
                    let result = env.packages.iter().try_for_each(|spec| {
                        pip.ensure_package_installed(ctx, &spec.name, spec.version.as_deref())
                            .map(|_| ())
                    });
                    pip.set_sudo(use_sudo);
                    result
                })
            })?;
        }
        Ok(())
    }
}

impl Capability for Virtualenv {
    fn create(_ctx: &Context) -> Result<Self> {
        Ok(Self::new())
    }
}
