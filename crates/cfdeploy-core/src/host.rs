//! Call-through to the plugin's merge command inside the host.
//!
//! [`invoke_asset_merge`] runs against a [`HostSession`], the host's own
//! scripting surface. Failures are reported on the host's diagnostic channel
//! and come back as `None`; nothing here raises into the host.

use serde_json::Value;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Plugin module that registers [`COMMAND_NAME`].
pub const PLUGIN_NAME: &str = "CharacterFactory.mll";

/// Merge + skin-weight export command registered by the plugin.
pub const COMMAND_NAME: &str = "characterfactoryfbxhandle";

/// Separator the command expects between input FBX paths.
pub const FILE_DELIMITER: &str = ";";

/// The host's scripting surface, as seen by the merge call-through.
pub trait HostSession {
    fn is_plugin_loaded(&self, plugin: &str) -> Result<bool>;

    fn load_plugin(&mut self, plugin: &str) -> Result<()>;

    /// Invoke a host command with positional string arguments; `None` is an
    /// absent optional argument.
    fn call(&mut self, command: &str, args: &[Option<&str>]) -> Result<Value>;

    /// Report an error on the host's diagnostic channel.
    fn display_error(&self, message: &str);
}

/// Load `plugin` if needed. Returns whether it is loaded afterwards.
pub fn ensure_plugin_loaded<S: HostSession + ?Sized>(session: &mut S, plugin: &str) -> bool {
    match load_on_demand(session, plugin) {
        Ok(loaded) => loaded,
        Err(e) => {
            session.display_error(&format!("Error loading plugin {}: {}", plugin, e));
            false
        }
    }
}

fn load_on_demand<S: HostSession + ?Sized>(session: &mut S, plugin: &str) -> Result<bool> {
    if !session.is_plugin_loaded(plugin)? {
        debug!(plugin, "Loading plugin");
        session.load_plugin(plugin)?;
    }
    session.is_plugin_loaded(plugin)
}

/// Merge `input_files` into `output_path`, optionally exporting skin weights
/// to `json_path`. `None` means the merge did not run or failed.
pub fn invoke_asset_merge<S, P>(
    session: &mut S,
    input_files: &[P],
    output_path: &str,
    json_path: Option<&str>,
) -> Option<Value>
where
    S: HostSession + ?Sized,
    P: AsRef<str>,
{
    if !ensure_plugin_loaded(session, PLUGIN_NAME) {
        session.display_error(&format!("Required plugin {} is not loaded", PLUGIN_NAME));
        return None;
    }

    if input_files.is_empty() {
        session.display_error(&format!("{} needs at least one FBX file", COMMAND_NAME));
        return None;
    }

    let joined = join_files(input_files);
    match session.call(COMMAND_NAME, &[Some(joined.as_str()), Some(output_path), json_path]) {
        Ok(value) => Some(value),
        Err(e) => {
            session.display_error(&format!("Error executing {} command: {}", COMMAND_NAME, e));
            None
        }
    }
}

/// Join paths in order with [`FILE_DELIMITER`].
pub fn join_files<P: AsRef<str>>(files: &[P]) -> String {
    files
        .iter()
        .map(|f| f.as_ref())
        .collect::<Vec<&str>>()
        .join(FILE_DELIMITER)
}

/// Host-side wrappers. Both report through `MGlobal.displayError` and
/// return a falsy value instead of raising into the host.
const MERGE_WRAPPERS: &str = r#"import maya.cmds as cmds
import maya.OpenMaya as om


def ensure_plugin_loaded(plugin_name=__PLUGIN__):
    try:
        if not cmds.pluginInfo(plugin_name, query=True, loaded=True):
            cmds.loadPlugin(plugin_name)
        return cmds.pluginInfo(plugin_name, query=True, loaded=True)
    except Exception as e:
        om.MGlobal.displayError("Error loading plugin {}: {}".format(plugin_name, e))
        return False


def __COMMAND__(fbx_files, output_path, json_path=None):
    if not ensure_plugin_loaded():
        om.MGlobal.displayError("Required plugin {} is not loaded".format(__PLUGIN__))
        return None
    if not fbx_files:
        om.MGlobal.displayError("__COMMAND__ needs at least one FBX file")
        return None
    try:
        return cmds.__COMMAND__(__DELIMITER__.join(fbx_files), output_path, json_path)
    except Exception as e:
        om.MGlobal.displayError("Error executing __COMMAND__ command: {}".format(e))
        return None

"#;

/// Python snippet performing the same call from the host's script editor.
pub fn render_merge_script<P: AsRef<str>>(
    input_files: &[P],
    output_path: &str,
    json_path: Option<&str>,
) -> Result<String> {
    if input_files.is_empty() {
        return Err(HarnessError::HostCommand(
            "at least one FBX file is required".to_string(),
        ));
    }

    let quote = |s: &str| serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s));

    let mut script = MERGE_WRAPPERS
        .replace("__PLUGIN__", &quote(PLUGIN_NAME))
        .replace("__DELIMITER__", &quote(FILE_DELIMITER))
        .replace("__COMMAND__", COMMAND_NAME);
    script.push_str("\nfbx_files = [\n");
    for file in input_files {
        script.push_str(&format!("    {},\n", quote(file.as_ref())));
    }
    script.push_str("]\n");
    script.push_str(&format!("output_path = {}\n", quote(output_path)));
    match json_path {
        Some(json) => script.push_str(&format!("json_path = {}\n", quote(json))),
        None => script.push_str("json_path = None\n"),
    }
    script.push_str(&format!(
        "\nresult = {}(fbx_files, output_path, json_path)\n",
        COMMAND_NAME
    ));
    Ok(script)
}
