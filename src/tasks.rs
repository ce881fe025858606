//! Typed task wrappers over [`InferenceClient::request`].
//!
//! Each wrapper runs the request for its task and decodes the normalized
//! output into a serde type. When a provider answers with a shape the type
//! does not cover, fall back to [`InferenceClient::request`].

use crate::api::{InferenceTask, Options, RequestArgs};
use crate::client::InferenceClient;
use crate::error::Result;
use crate::helper::InferenceOutput;
use crate::request::EventStream;
use crate::validate::{decode, decode_first, decode_list};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionOutput {
    pub id: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionOutputChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionOutputChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatCompletionOutputMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionOutputMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

/// One chunk of a streamed chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionStreamOutput {
    pub id: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionStreamOutputChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionStreamOutputChoice {
    #[serde(default)]
    pub index: u32,
    pub delta: ChatCompletionStreamOutputDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionStreamOutputDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGenerationOutput {
    pub generated_text: String,
}

/// One token event of a streamed text generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGenerationStreamOutput {
    #[serde(default)]
    pub index: Option<u32>,
    pub token: TextGenerationStreamToken,
    /// Set on the last event only.
    #[serde(default)]
    pub generated_text: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGenerationStreamToken {
    pub id: u32,
    pub text: String,
    #[serde(default)]
    pub logprob: Option<f64>,
    #[serde(default)]
    pub special: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomaticSpeechRecognitionOutput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<Value>>,
}

/// Embeddings at whatever nesting the model produces: pooled, per input, per
/// token, or per token per input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureExtractionOutput {
    Embedding(Vec<f32>),
    Embeddings(Vec<Vec<f32>>),
    TokenEmbeddings(Vec<Vec<Vec<f32>>>),
    BatchTokenEmbeddings(Vec<Vec<Vec<Vec<f32>>>>),
}

/// A label with its score, shared by the classification tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutput {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClassificationOutput {
    #[serde(default)]
    pub entity_group: Option<String>,
    /// Set instead of `entity_group` when no aggregation strategy is used.
    #[serde(default)]
    pub entity: Option<String>,
    pub score: f64,
    pub word: String,
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub end: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillMaskOutput {
    pub score: f64,
    pub sequence: String,
    pub token: u32,
    pub token_str: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizationOutput {
    pub summary_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationOutput {
    pub translation_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnsweringOutput {
    pub answer: String,
    pub score: f64,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetectionOutput {
    pub label: String,
    pub score: f64,
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageToTextOutput {
    pub generated_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSegmentationOutput {
    pub label: String,
    /// Base64-encoded PNG mask.
    pub mask: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// One separated or enhanced track of an audio-to-audio model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioToAudioOutput {
    pub label: String,
    /// Base64-encoded audio.
    pub blob: String,
    #[serde(rename = "content-type")]
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuestionAnsweringOutput {
    pub answer: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub end: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualQuestionAnsweringOutput {
    pub answer: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableQuestionAnsweringOutput {
    pub answer: String,
    pub cells: Vec<String>,
    pub coordinates: Vec<Vec<usize>>,
    #[serde(default)]
    pub aggregator: Option<String>,
}

const CLASSIFICATION_SHAPE: &str = "Array<{label: string, score: number}>";

/// Zero-shot pipelines may answer `{sequence, labels, scores}`; turn that into
/// label/score pairs.
fn zero_shot_pairs(value: Value) -> Value {
    let first = match &value {
        Value::Array(items) if items.len() == 1 && items[0].get("labels").is_some() => &items[0],
        other => other,
    };
    let (Some(labels), Some(scores)) = (
        first.get("labels").and_then(Value::as_array),
        first.get("scores").and_then(Value::as_array),
    ) else {
        return value;
    };
    Value::Array(
        labels
            .iter()
            .zip(scores)
            .map(|(label, score)| serde_json::json!({"label": label, "score": score}))
            .collect(),
    )
}

fn typed_stream<T>(stream: EventStream<Value>, expected: &'static str) -> EventStream<T>
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    Box::pin(stream.map(move |item| item.and_then(|value| decode(value, expected))))
}

impl InferenceClient {
    async fn json_task(
        &self,
        args: &RequestArgs,
        task: InferenceTask,
        options: &Options,
    ) -> Result<Value> {
        Ok(self.request(args, Some(task), options).await?.into_json())
    }

    /// OpenAI-compatible chat completion.
    pub async fn chat_completion(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<ChatCompletionOutput> {
        let value = self
            .json_task(args, InferenceTask::Conversational, options)
            .await?;
        decode(value, "ChatCompletionOutput")
    }

    /// Streamed chat completion; sets `stream: true` on the request.
    pub async fn chat_completion_stream(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<EventStream<ChatCompletionStreamOutput>> {
        let args = args.clone().arg("stream", true);
        let stream = self
            .streaming_request(&args, Some(InferenceTask::Conversational), options)
            .await?;
        Ok(typed_stream(stream, "ChatCompletionStreamOutput"))
    }

    pub async fn text_generation(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<TextGenerationOutput> {
        let value = self
            .json_task(args, InferenceTask::TextGeneration, options)
            .await?;
        decode_first(value, "{generated_text: string}")
    }

    /// Streamed text generation; sets `stream: true` on the request.
    pub async fn text_generation_stream(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<EventStream<TextGenerationStreamOutput>> {
        let args = args.clone().arg("stream", true);
        let stream = self
            .streaming_request(&args, Some(InferenceTask::TextGeneration), options)
            .await?;
        Ok(typed_stream(
            stream,
            "{token: {id: number, text: string}, generated_text: string | null}",
        ))
    }

    /// Generated image as a blob, URL, data URL, or raw JSON per
    /// [`Options::output_type`].
    pub async fn text_to_image(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<InferenceOutput> {
        self.request(args, Some(InferenceTask::TextToImage), options)
            .await
    }

    pub async fn text_to_video(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<InferenceOutput> {
        self.request(args, Some(InferenceTask::TextToVideo), options)
            .await
    }

    pub async fn text_to_speech(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<InferenceOutput> {
        self.request(args, Some(InferenceTask::TextToSpeech), options)
            .await
    }

    pub async fn automatic_speech_recognition(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<AutomaticSpeechRecognitionOutput> {
        let value = self
            .json_task(args, InferenceTask::AutomaticSpeechRecognition, options)
            .await?;
        decode(value, "{text: string}")
    }

    pub async fn feature_extraction(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<FeatureExtractionOutput> {
        let value = self
            .json_task(args, InferenceTask::FeatureExtraction, options)
            .await?;
        decode(value, "Array<number[][][] | number[][] | number[] | number>")
    }

    pub async fn sentence_similarity(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<f64>> {
        let value = self
            .json_task(args, InferenceTask::SentenceSimilarity, options)
            .await?;
        decode(value, "number[]")
    }

    pub async fn text_classification(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<ClassificationOutput>> {
        let value = self
            .json_task(args, InferenceTask::TextClassification, options)
            .await?;
        decode_list(value, CLASSIFICATION_SHAPE)
    }

    pub async fn token_classification(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<TokenClassificationOutput>> {
        let value = self
            .json_task(args, InferenceTask::TokenClassification, options)
            .await?;
        decode_list(
            value,
            "Array<{end: number, entity_group: string, score: number, start: number, word: string}>",
        )
    }

    pub async fn fill_mask(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<FillMaskOutput>> {
        let value = self.json_task(args, InferenceTask::FillMask, options).await?;
        decode_list(
            value,
            "Array<{score: number, sequence: string, token: number, token_str: string}>",
        )
    }

    pub async fn summarization(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<SummarizationOutput> {
        let value = self
            .json_task(args, InferenceTask::Summarization, options)
            .await?;
        decode_first(value, "{summary_text: string}")
    }

    pub async fn translation(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<TranslationOutput> {
        let value = self
            .json_task(args, InferenceTask::Translation, options)
            .await?;
        decode_first(value, "{translation_text: string}")
    }

    pub async fn question_answering(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<QuestionAnsweringOutput> {
        let value = self
            .json_task(args, InferenceTask::QuestionAnswering, options)
            .await?;
        decode_first(
            value,
            "{answer: string, end: number, score: number, start: number}",
        )
    }

    pub async fn zero_shot_classification(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<ClassificationOutput>> {
        let value = self
            .json_task(args, InferenceTask::ZeroShotClassification, options)
            .await?;
        decode_list(zero_shot_pairs(value), CLASSIFICATION_SHAPE)
    }

    pub async fn image_classification(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<ClassificationOutput>> {
        let value = self
            .json_task(args, InferenceTask::ImageClassification, options)
            .await?;
        decode_list(value, CLASSIFICATION_SHAPE)
    }

    pub async fn object_detection(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<ObjectDetectionOutput>> {
        let value = self
            .json_task(args, InferenceTask::ObjectDetection, options)
            .await?;
        decode_list(
            value,
            "Array<{label: string, score: number, box: {xmin: number, ymin: number, xmax: number, ymax: number}}>",
        )
    }

    pub async fn image_to_text(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<ImageToTextOutput> {
        let value = self
            .json_task(args, InferenceTask::ImageToText, options)
            .await?;
        decode_first(value, "{generated_text: string}")
    }

    pub async fn audio_classification(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<ClassificationOutput>> {
        let value = self
            .json_task(args, InferenceTask::AudioClassification, options)
            .await?;
        decode_list(value, CLASSIFICATION_SHAPE)
    }

    /// Image sent with [`RequestArgs::data`].
    pub async fn image_segmentation(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<ImageSegmentationOutput>> {
        let value = self
            .json_task(args, InferenceTask::ImageSegmentation, options)
            .await?;
        decode_list(value, "Array<{label: string, mask: string, score: number}>")
    }

    /// Candidate labels go in `parameters.candidate_labels`, the image in
    /// [`RequestArgs::image`].
    pub async fn zero_shot_image_classification(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<ClassificationOutput>> {
        let value = self
            .json_task(args, InferenceTask::ZeroShotImageClassification, options)
            .await?;
        decode_list(value, CLASSIFICATION_SHAPE)
    }

    /// Send the image with [`RequestArgs::data`], or with
    /// [`RequestArgs::encoded_inputs`] when `parameters` are needed.
    pub async fn image_to_image(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<InferenceOutput> {
        self.request(args, Some(InferenceTask::ImageToImage), options)
            .await
    }

    pub async fn text_to_audio(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<InferenceOutput> {
        self.request(args, Some(InferenceTask::TextToAudio), options)
            .await
    }

    pub async fn audio_to_audio(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<AudioToAudioOutput>> {
        let value = self
            .json_task(args, InferenceTask::AudioToAudio, options)
            .await?;
        decode(
            value,
            "Array<{label: string, blob: string, content-type: string}>",
        )
    }

    /// Question and page image go in `inputs`, see [`RequestArgs::question`]
    /// and [`RequestArgs::image`].
    pub async fn document_question_answering(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<DocumentQuestionAnsweringOutput> {
        let value = self
            .json_task(args, InferenceTask::DocumentQuestionAnswering, options)
            .await?;
        decode_first(
            value,
            "Array<{answer: string, end?: number, score?: number, start?: number}>",
        )
    }

    pub async fn visual_question_answering(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<VisualQuestionAnsweringOutput> {
        let value = self
            .json_task(args, InferenceTask::VisualQuestionAnswering, options)
            .await?;
        decode_first(value, "Array<{answer: string, score: number}>")
    }

    /// `inputs` is `{query, table}`, the table a map of column name to cells.
    pub async fn table_question_answering(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<TableQuestionAnsweringOutput> {
        let value = self
            .json_task(args, InferenceTask::TableQuestionAnswering, options)
            .await?;
        decode_first(
            value,
            "{aggregator: string, answer: string, cells: string[], coordinates: number[][]}",
        )
    }

    /// One predicted label per row of `inputs.data`.
    pub async fn tabular_classification(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<f64>> {
        let value = self
            .json_task(args, InferenceTask::TabularClassification, options)
            .await?;
        decode(value, "number[]")
    }

    /// One predicted value per row of `inputs.data`.
    pub async fn tabular_regression(
        &self,
        args: &RequestArgs,
        options: &Options,
    ) -> Result<Vec<f64>> {
        let value = self
            .json_task(args, InferenceTask::TabularRegression, options)
            .await?;
        decode(value, "number[]")
    }
}
