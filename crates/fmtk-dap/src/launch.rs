use std::path::PathBuf;

use fmtk_process::{SpawnSpec, Wrapper};

use crate::modules::ModuleRoots;
use crate::protocol::LaunchArgs;

/// Command line for the game, wrapped in the native debugger when one is
/// configured.
pub fn spawn_spec(args: &LaunchArgs) -> SpawnSpec {
    let mut argv = args.args.clone();
    if let Some(mods) = &args.mods_path {
        if !argv.iter().any(|a| a == "--mod-directory") {
            argv.push("--mod-directory".to_string());
            argv.push(mods.clone());
        }
    }
    SpawnSpec {
        program: PathBuf::from(&args.program),
        args: argv,
        cwd: args.cwd.as_ref().map(PathBuf::from),
        env: args
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        wrapper: args.native_debugger.as_ref().map(|program| Wrapper {
            program: PathBuf::from(program),
            args: args.native_debugger_args.clone(),
        }),
    }
}

pub fn module_roots(args: &LaunchArgs) -> ModuleRoots {
    ModuleRoots {
        mods_path: args.mods_path.as_ref().map(PathBuf::from),
        data_path: args.data_path.as_ref().map(PathBuf::from),
        user_data_path: args.user_data_path.as_ref().map(PathBuf::from),
        workspace_folders: args.workspace_folders.iter().map(PathBuf::from).collect(),
    }
}
