//! Provider-independent stream translation
//!
//! A [`StreamTranslator`] owns one provider decoder and guarantees the
//! output contract: chunks in arrival order, exactly one terminal marker,
//! and nothing after it.

use super::chunk::NormalizedChunk;
use super::gemini::GeminiStreamDecoder;
use super::openai::OpenAiStreamDecoder;

/// Framing used by an upstream streaming body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Newline-delimited `data:` records ending with `data: [DONE]`
    OpenAiSse,
    /// Concatenated top-level JSON objects with no end sentinel
    GeminiJson,
}

#[derive(Debug, Clone)]
pub struct TranslatorOptions {
    /// Relay reasoning text as content for clients without a reasoning channel
    pub fold_reasoning: bool,
    /// Model name placed in synthesized envelopes
    pub model: String,
}

#[derive(Debug)]
enum Decoder {
    OpenAi(OpenAiStreamDecoder),
    Gemini(GeminiStreamDecoder),
}

#[derive(Debug)]
pub struct StreamTranslator {
    decoder: Decoder,
    finished: bool,
}

impl StreamTranslator {
    pub fn new(format: WireFormat, options: TranslatorOptions) -> Self {
        let decoder = match format {
            WireFormat::OpenAiSse => Decoder::OpenAi(OpenAiStreamDecoder::new(options.fold_reasoning)),
            WireFormat::GeminiJson => {
                Decoder::Gemini(GeminiStreamDecoder::new(options.model, options.fold_reasoning))
            }
        };
        Self {
            decoder,
            finished: false,
        }
    }

    /// Feed one read from the upstream body
    pub fn push(&mut self, bytes: &[u8]) -> Vec<NormalizedChunk> {
        if self.finished {
            return Vec::new();
        }

        let mut out = Vec::new();
        match &mut self.decoder {
            Decoder::OpenAi(decoder) => decoder.push(bytes, &mut out),
            Decoder::Gemini(decoder) => decoder.push(bytes, &mut out),
        }
        self.seal(out)
    }

    /// The upstream body ended normally
    ///
    /// Flushes any trailing record and guarantees a terminal marker.
    pub fn finish(&mut self) -> Vec<NormalizedChunk> {
        if self.finished {
            return Vec::new();
        }

        let mut out = Vec::new();
        match &mut self.decoder {
            Decoder::OpenAi(decoder) => decoder.flush(&mut out),
            Decoder::Gemini(decoder) => decoder.flush(&mut out),
        }
        let mut out = self.seal(out);
        if !self.finished {
            self.finished = true;
            out.push(NormalizedChunk::done());
        }
        out
    }

    /// Stop immediately with an error marker (abort, transport failure)
    pub fn fail(&mut self, reason: impl Into<String>) -> Option<NormalizedChunk> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(NormalizedChunk::failed(reason))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Truncate after the first terminal marker
    fn seal(&mut self, mut out: Vec<NormalizedChunk>) -> Vec<NormalizedChunk> {
        if let Some(done_at) = out.iter().position(NormalizedChunk::is_done) {
            out.truncate(done_at + 1);
            self.finished = true;
        }
        out
    }
}
