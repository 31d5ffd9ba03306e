use super::TextureRef;

#[derive(Clone, Debug)]
pub enum BlitCommand {
    CopyTextureToTexture {
        source: TextureRef,
        destination: TextureRef,
    },
    GenerateMipmap {
        texture: TextureRef,
    },
}

#[derive(Debug, Default)]
pub struct BlitPass {
    label: String,
    commands: Vec<BlitCommand>,
}

impl BlitPass {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), commands: Vec::new() }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Copies all of `source` into the top-left of `destination`.
    pub fn add_copy(&mut self, source: TextureRef, destination: TextureRef) {
        self.commands.push(BlitCommand::CopyTextureToTexture { source, destination });
    }

    pub fn generate_mipmap(&mut self, texture: TextureRef) {
        self.commands.push(BlitCommand::GenerateMipmap { texture });
    }

    pub fn commands(&self) -> &[BlitCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<BlitCommand> {
        self.commands
    }
}
