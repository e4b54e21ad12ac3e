//! `kubectl`-backed implementation of the cluster traits.

use std::ffi::OsString;

use serde_json::Value;
use tracing::debug;

use crate::config::ClusterCredentials;

use super::{
    ClusterError, ClusterFuture, CommandOutput, CommandRunner, ControlPlane, ObjectList,
    ProcessCommandRunner, Resource, Volume, VolumeCatalog, parse_volume_list,
};

/// Default `kubectl` binary name.
pub const DEFAULT_KUBECTL_BIN: &str = "kubectl";

const LONGHORN_VOLUMES: &str = "volumes.longhorn.io";

/// Control-plane client that shells out to `kubectl` and parses its JSON.
#[derive(Clone, Debug)]
pub struct Kubectl<R: CommandRunner> {
    program: String,
    credentials: ClusterCredentials,
    longhorn_namespace: String,
    runner: R,
}

impl Kubectl<ProcessCommandRunner> {
    /// Creates a client wired to the real process runner.
    #[must_use]
    pub fn with_process_runner(
        program: impl Into<String>,
        credentials: ClusterCredentials,
        longhorn_namespace: impl Into<String>,
    ) -> Self {
        Self::new(program, credentials, longhorn_namespace, ProcessCommandRunner)
    }
}

impl<R> Kubectl<R>
where
    R: CommandRunner + Clone + 'static,
{
    /// Creates a client using the provided runner.
    #[must_use]
    pub fn new(
        program: impl Into<String>,
        credentials: ClusterCredentials,
        longhorn_namespace: impl Into<String>,
        runner: R,
    ) -> Self {
        Self {
            program: program.into(),
            credentials,
            longhorn_namespace: longhorn_namespace.into(),
            runner,
        }
    }

    /// Program used for every invocation.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn base_args(&self, verb: &str) -> Vec<OsString> {
        let mut args = Vec::new();
        if let ClusterCredentials::Kubeconfig(path) = &self.credentials {
            args.push(OsString::from("--kubeconfig"));
            args.push(OsString::from(path.as_str()));
        }
        args.push(OsString::from(verb));
        args
    }

    fn push_namespace<T: Resource>(args: &mut Vec<OsString>, namespace: Option<&str>) {
        if let (true, Some(ns)) = (T::NAMESPACED, namespace) {
            args.push(OsString::from("-n"));
            args.push(OsString::from(ns));
        }
    }

    async fn invoke(
        &self,
        args: Vec<OsString>,
        input: Option<Vec<u8>>,
    ) -> Result<CommandOutput, ClusterError> {
        debug!(program = %self.program, ?args, "invoking kubectl");
        let runner = self.runner.clone();
        let program = self.program.clone();
        tokio::task::spawn_blocking(move || match input {
            Some(bytes) => runner.run_with_input(&program, &args, &bytes),
            None => runner.run(&program, &args),
        })
        .await
        .map_err(|err| ClusterError::Spawn {
            program: self.program.clone(),
            message: err.to_string(),
        })?
    }

    fn failure(&self, action: String, output: CommandOutput) -> ClusterError {
        ClusterError::CommandFailure {
            program: self.program.clone(),
            action,
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(
        resource: &str,
        stdout: &str,
    ) -> Result<T, ClusterError> {
        serde_json::from_str(stdout).map_err(|err| ClusterError::Parse {
            resource: resource.to_owned(),
            message: err.to_string(),
        })
    }

    async fn get_object<T: Resource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<T>, ClusterError> {
        let mut args = self.base_args("get");
        args.push(OsString::from(T::PLURAL));
        args.push(OsString::from(name));
        Self::push_namespace::<T>(&mut args, namespace);
        args.extend([OsString::from("-o"), OsString::from("json")]);

        let output = self.invoke(args, None).await?;
        if output.is_success() {
            return Self::parse(T::PLURAL, &output.stdout).map(Some);
        }
        if is_not_found(&output) {
            return Ok(None);
        }
        Err(self.failure(format!("get {} {name}", T::PLURAL), output))
    }

    async fn create_object<T: Resource>(&self, object: &T) -> Result<T, ClusterError> {
        let manifest = render_manifest(object)?;
        let mut args = self.base_args("create");
        args.extend([
            OsString::from("-f"),
            OsString::from("-"),
            OsString::from("-o"),
            OsString::from("json"),
        ]);

        let output = self.invoke(args, Some(manifest.into_bytes())).await?;
        if output.is_success() {
            return Self::parse(T::PLURAL, &output.stdout);
        }
        if output.stderr.contains("AlreadyExists") {
            return Err(ClusterError::AlreadyExists {
                kind: T::KIND.to_owned(),
                name: object.name().to_owned(),
            });
        }
        Err(self.failure(format!("create {} {}", T::PLURAL, object.name()), output))
    }

    async fn list_objects<T: Resource>(
        &self,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<T>, ClusterError> {
        let mut args = self.base_args("get");
        args.push(OsString::from(T::PLURAL));
        Self::push_namespace::<T>(&mut args, namespace);
        if let Some(selector) = selector {
            args.push(OsString::from("-l"));
            args.push(OsString::from(selector));
        }
        args.extend([OsString::from("-o"), OsString::from("json")]);

        let output = self.invoke(args, None).await?;
        if !output.is_success() {
            return Err(self.failure(format!("get {}", T::PLURAL), output));
        }
        let list: ObjectList<T> = Self::parse(T::PLURAL, &output.stdout)?;
        Ok(list.items)
    }

    async fn delete_object<T: Resource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut args = self.base_args("delete");
        args.push(OsString::from(T::PLURAL));
        args.push(OsString::from(name));
        Self::push_namespace::<T>(&mut args, namespace);
        args.push(OsString::from("--wait=false"));

        let output = self.invoke(args, None).await?;
        if output.is_success() {
            return Ok(());
        }
        if is_not_found(&output) {
            return Err(ClusterError::NotFound {
                kind: T::KIND.to_owned(),
                name: name.to_owned(),
            });
        }
        Err(self.failure(format!("delete {} {name}", T::PLURAL), output))
    }

    async fn fetch_volumes(&self) -> Result<Vec<Volume>, ClusterError> {
        let mut args = self.base_args("get");
        args.extend([
            OsString::from(LONGHORN_VOLUMES),
            OsString::from("-n"),
            OsString::from(&self.longhorn_namespace),
            OsString::from("-o"),
            OsString::from("json"),
        ]);

        let output = self.invoke(args, None).await?;
        if !output.is_success() {
            return Err(self.failure(format!("get {LONGHORN_VOLUMES}"), output));
        }
        parse_volume_list(&output.stdout)
    }
}

fn is_not_found(output: &CommandOutput) -> bool {
    output.stderr.contains("NotFound")
}

/// Renders `object` as a JSON manifest carrying its `apiVersion` and `kind`.
///
/// # Errors
///
/// Returns [`ClusterError::Parse`] when the object cannot be serialised.
pub fn render_manifest<T: Resource>(object: &T) -> Result<String, ClusterError> {
    let parse_error = |message: String| ClusterError::Parse {
        resource: T::PLURAL.to_owned(),
        message,
    };
    let mut value = serde_json::to_value(object).map_err(|err| parse_error(err.to_string()))?;
    let Value::Object(map) = &mut value else {
        return Err(parse_error(String::from("manifest is not a JSON object")));
    };
    map.insert(
        String::from("apiVersion"),
        Value::String(T::API_VERSION.to_owned()),
    );
    map.insert(String::from("kind"), Value::String(T::KIND.to_owned()));
    serde_json::to_string(&value).map_err(|err| parse_error(err.to_string()))
}

impl<R> ControlPlane for Kubectl<R>
where
    R: CommandRunner + Clone + 'static,
{
    fn get<'a, T: Resource>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<T>> {
        Box::pin(self.get_object(namespace, name))
    }

    fn create<'a, T: Resource>(&'a self, object: &'a T) -> ClusterFuture<'a, T> {
        Box::pin(self.create_object(object))
    }

    fn list<'a, T: Resource>(
        &'a self,
        namespace: Option<&'a str>,
        selector: Option<&'a str>,
    ) -> ClusterFuture<'a, Vec<T>> {
        Box::pin(self.list_objects(namespace, selector))
    }

    fn delete<'a, T: Resource>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> ClusterFuture<'a, ()> {
        Box::pin(self.delete_object::<T>(namespace, name))
    }
}

impl<R> VolumeCatalog for Kubectl<R>
where
    R: CommandRunner + Clone + 'static,
{
    fn list_volumes(&self) -> ClusterFuture<'_, Vec<Volume>> {
        Box::pin(self.fetch_volumes())
    }
}
