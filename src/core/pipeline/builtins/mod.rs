//! Components shipped with the engine and registered by the CLI.

pub mod batchers;
pub mod codeowners;
pub mod command;
pub mod filters;
pub mod inputs;
pub mod params;
pub mod submitters;

use crate::core::pipeline::batch::BatchPolicy;
use crate::core::pipeline::component::{Filter, Input, Submitter, Transformer, Validator};
use crate::core::pipeline::registry::{ComponentRegistry, ComponentRegistryBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Register every built-in component; file-backed ones resolve paths against
/// `workspace_root`.
pub fn register_builtins(builder: &mut ComponentRegistryBuilder, workspace_root: &Path) {
    let root: PathBuf = workspace_root.to_path_buf();

    builder
        .register_input("inline", |params| {
            Ok(Arc::new(inputs::InlineInput::from_params(params)?) as Arc<dyn Input>)
        })
        .register_input("empty", |_| Ok(Arc::new(inputs::EmptyInput) as Arc<dyn Input>));
    {
        let root = root.clone();
        builder.register_input("directory", move |params| {
            Ok(Arc::new(inputs::DirectoryInput::from_params(params, &root)?) as Arc<dyn Input>)
        });
    }
    {
        let root = root.clone();
        builder.register_input("git_grep", move |params| {
            Ok(Arc::new(inputs::GitGrepInput::from_params(params, &root)?) as Arc<dyn Input>)
        });
    }

    builder
        .register_filter("extension", |params| {
            Ok(Arc::new(filters::ExtensionFilter::from_params(params)?) as Arc<dyn Filter>)
        })
        .register_filter("regex", |params| {
            Ok(Arc::new(filters::RegexFilter::from_params(params)?) as Arc<dyn Filter>)
        })
        .register_filter("key_hash_shard", |params| {
            Ok(Arc::new(filters::KeyHashShardFilter::from_params(params)?) as Arc<dyn Filter>)
        });

    builder
        .register_batcher("single", |params| {
            Ok(Arc::new(batchers::SingleBatcher::from_params(params)?) as Arc<dyn BatchPolicy>)
        })
        .register_batcher("chunk", |params| {
            Ok(Arc::new(batchers::ChunkBatcher::from_params(params)?) as Arc<dyn BatchPolicy>)
        })
        .register_batcher("directory", |params| {
            Ok(Arc::new(batchers::DirectoryBatcher::from_params(params)?) as Arc<dyn BatchPolicy>)
        })
        .register_batcher("extra_data", |params| {
            Ok(Arc::new(batchers::ExtraDataBatcher::from_params(params)?) as Arc<dyn BatchPolicy>)
        });
    {
        let root = root.clone();
        builder.register_batcher("codeowners", move |params| {
            Ok(Arc::new(batchers::CodeownersBatcher::from_params(params, &root)?)
                as Arc<dyn BatchPolicy>)
        });
    }
    {
        let root = root.clone();
        builder.register_batcher("file_regex", move |params| {
            Ok(Arc::new(batchers::FileRegexBatcher::from_params(params, &root)?)
                as Arc<dyn BatchPolicy>)
        });
    }

    {
        let root = root.clone();
        builder.register_transformer("command", move |params| {
            let spec = command::CommandSpec::from_params(params, &root)?;
            Ok(Arc::new(command::CommandTransformer::new(spec)) as Arc<dyn Transformer>)
        });
    }
    {
        let root = root.clone();
        builder.register_validator("command", move |params| {
            Ok(Arc::new(command::CommandValidator::from_params(params, &root)?) as Arc<dyn Validator>)
        });
    }

    builder.register_submitter("noop", |_| {
        Ok(Arc::new(submitters::NoopSubmitter) as Arc<dyn Submitter>)
    });
    {
        let root = root.clone();
        builder.register_submitter("git", move |params| {
            Ok(Arc::new(submitters::GitSubmitter::from_params(params, &root)?) as Arc<dyn Submitter>)
        });
    }
    builder.register_submitter("github", move |params| {
        Ok(Arc::new(submitters::GithubSubmitter::from_params(params, &root)?) as Arc<dyn Submitter>)
    });
}

/// Registry holding only the built-in components.
pub fn builtin_registry(workspace_root: &Path) -> ComponentRegistry {
    let mut builder = ComponentRegistry::builder();
    register_builtins(&mut builder, workspace_root);
    builder.build()
}
