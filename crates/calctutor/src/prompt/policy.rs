//! The instruction document and fixed reply strings.
//!
//! Everything the tutor says on its own behalf lives here rather than in
//! code: the system prompt text, the acknowledgment that follows it, the
//! greeting, and the fallback replies. Two documents are built in; others
//! can be loaded from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A labelled formatting example shown to the model verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FormattingExample {
    pub label: String,
    pub text: String,
}

/// Labels used when rendering the catalog block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogLabels {
    pub heading: String,
    pub exercise: String,
    pub function: String,
    pub target: String,
    pub conclusion: String,
    /// Closing line after each record.
    pub delimiter: String,
    /// Rendered instead of the catalog block when there is nothing to teach.
    pub no_exercises: String,
}

const RECORD_DELIMITER: &str = "------------------------";

impl CatalogLabels {
    pub fn english() -> Self {
        Self {
            heading: "EXERCISE DATABASE YOU MAY TEACH:".into(),
            exercise: "EXERCISE ID".into(),
            function: "FUNCTION".into(),
            target: "TARGET DERIVATIVE".into(),
            conclusion: "CONCLUSION".into(),
            delimiter: RECORD_DELIMITER.into(),
            no_exercises: "No exercises are loaded in the database.".into(),
        }
    }

    pub fn spanish() -> Self {
        Self {
            heading: "BASE DE DATOS DE EJERCICIOS QUE PUEDES ENSEÑAR:".into(),
            exercise: "EJERCICIO ID:".into(),
            function: "FUNCION".into(),
            target: "DERIVADA FINAL (OBJETIVO)".into(),
            conclusion: "CONCLUSIÓN".into(),
            delimiter: RECORD_DELIMITER.into(),
            no_exercises: "No hay ejercicios cargados en la base de datos.".into(),
        }
    }
}

impl Default for CatalogLabels {
    fn default() -> Self {
        Self::spanish()
    }
}

/// Fixed user-facing strings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FixedReplies {
    /// First turn of every new session. Shown locally, never sent upstream.
    pub greeting: String,
    /// The provider returned no content.
    pub safety_blocked: String,
    /// The provider rejected the credential.
    pub invalid_credential: String,
    /// Any other provider failure.
    pub technical_difficulties: String,
    /// Shown while an interactive session has no validated credential.
    pub awaiting_credential: String,
    /// Shown when the catalog failed to load.
    pub catalog_unavailable: String,
    /// An empty credential was submitted.
    pub credential_missing: String,
    /// Credential validation failed.
    pub credential_rejected: String,
    /// Credential validation succeeded.
    pub credential_accepted: String,
}

impl FixedReplies {
    pub fn english() -> Self {
        Self {
            greeting: "Hi! I'm your calculus teacher. Pick an exercise from the list \
                       (by its ID) and I'll teach you how to solve it step by step. \
                       You can ask me questions at any time!"
                .into(),
            safety_blocked: "The model did not produce a response. This can happen \
                             because of safety filters."
                .into(),
            invalid_credential: "I could not connect. Please verify your API key.".into(),
            technical_difficulties: "Sorry, I'm having technical difficulties.".into(),
            awaiting_credential: "Welcome! Enter your Google GenAI API key to get started."
                .into(),
            catalog_unavailable: "The app cannot start because the exercise database \
                                  could not be loaded."
                .into(),
            credential_missing: "Please enter an API key.".into(),
            credential_rejected: "Error: the API key is not valid.".into(),
            credential_accepted: "API key validated!".into(),
        }
    }

    pub fn spanish() -> Self {
        Self {
            greeting: "¡Hola! Soy tu profesor de cálculo. Elige un ejercicio de la lista \
                       (por su ID) y te enseñaré a resolverlo paso a paso. \
                       ¡Puedes hacerme preguntas en cualquier momento!"
                .into(),
            safety_blocked: "El modelo no generó una respuesta. Esto puede ocurrir \
                             debido a los filtros de seguridad."
                .into(),
            invalid_credential: "No pude conectarme. Por favor, verifica tu API Key.".into(),
            technical_difficulties: "Lo siento, estoy teniendo problemas técnicos.".into(),
            awaiting_credential: "¡Bienvenido! Ingresa tu API Key de Google GenAI para \
                                  comenzar."
                .into(),
            catalog_unavailable: "La aplicación no puede iniciar porque la base de datos \
                                  de ejercicios no se pudo cargar."
                .into(),
            credential_missing: "Por favor, ingresa una API Key.".into(),
            credential_rejected: "Error: La API Key no es válida.".into(),
            credential_accepted: "¡API Key validada!".into(),
        }
    }
}

impl Default for FixedReplies {
    fn default() -> Self {
        Self::spanish()
    }
}

/// The full instruction document.
///
/// Missing fields in a JSON document fall back to the built-in Spanish
/// document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyDocument {
    pub preamble: String,
    pub rules_heading: String,
    /// Operating rules, rendered as a numbered list.
    pub rules: Vec<String>,
    pub reference_heading: String,
    /// Derivative rule reference, rendered verbatim.
    pub reference: String,
    pub examples_heading: String,
    pub incorrect_example: FormattingExample,
    pub correct_example: FormattingExample,
    pub examples_closing: String,
    pub catalog: CatalogLabels,
    /// Model-role reply placed after the system prompt in every transcript.
    pub acknowledgment: String,
    pub replies: FixedReplies,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self::spanish()
    }
}

impl PolicyDocument {
    /// Load a document from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read policy file '{}': {e}", path.display()))?;
        serde_json::from_str(&text)
            .map_err(|e| format!("failed to parse policy file '{}': {e}", path.display()))
    }

    pub fn english() -> Self {
        Self {
            preamble: "You are 'AI Teacher', a Calculus 1 tutor with an extremely strict \
                       formatting rule. Your mission is to teach how to solve the \
                       derivatives of the exercises in your database, following the rules \
                       to the letter."
                .into(),
            rules_heading: "STRICT OPERATING RULES (NO EXCEPTIONS)".into(),
            rules: vec![
                "**FOCUSED TEACHING:** Your knowledge is STRICTLY limited to the exercises \
                 in the database. If a user asks you to differentiate any other function or \
                 asks about other topics, politely decline."
                    .into(),
                "**INTERACTIVITY:** You must be able to answer follow-up questions about \
                 the steps or the differentiation rules used in an exercise."
                    .into(),
                "**MASTER FORMATTING RULE (THE MOST IMPORTANT ONE):**\n\
                 \x20  - Writing text and mathematical expressions on the same line is \
                 **ABSOLUTELY FORBIDDEN**.\n\
                 \x20  - ANY mathematical expression, however small (a variable, a number, a \
                 whole function), must be on its own line inside a Markdown math block.\n\
                 \x20  - The only allowed math format is the block format: $$ ... $$. The \
                 inline format ($ ... $) is forbidden."
                    .into(),
                "**NUMBERED STEPS:** Enumerate every step of each procedure explicitly: \
                 Step 1, Step 2, and so on."
                    .into(),
            ],
            reference_heading: "Reference: Basic Differentiation Rules".into(),
            reference: ENGLISH_REFERENCE.into(),
            examples_heading: "YOU MUST FOLLOW THIS MANDATORY TRANSFORMATION EXAMPLE".into(),
            incorrect_example: FormattingExample {
                label: "INCORRECT EXAMPLE (FORBIDDEN):".into(),
                text: "The function is $g(x) = 2x^2 - 8x$. To differentiate it, we apply \
                       the rule to $2x^2$ and then..."
                    .into(),
            },
            correct_example: FormattingExample {
                label: "CORRECT EXAMPLE (MANDATORY):".into(),
                text: "The function we are going to differentiate is:\n\n\n\
                       $$ g(x) = 2x^2 - 8x $$\n\n\n\
                       To differentiate it, we first apply the Power Rule to the term:\n\n\n\
                       $$ 2x^2 $$\n\n\n\
                       Then we differentiate the second term:"
                    .into(),
            },
            examples_closing: "Apply this \"text on one line, math block on the next\" \
                               logic to EVERY part of your answer."
                .into(),
            catalog: CatalogLabels::english(),
            acknowledgment: "Understood. The formatting rule comes above all else: I will \
                             NEVER write math on the same line as text. Every mathematical \
                             expression, whatever its size, goes in its own $$...$$ block."
                .into(),
            replies: FixedReplies::english(),
        }
    }

    pub fn spanish() -> Self {
        Self {
            preamble: "Eres 'Profesor IA', un tutor de Cálculo 1 con una regla de formato \
                       extremadamente estricta. Tu misión es enseñar a resolver derivadas de \
                       los ejercicios de tu base de datos, siguiendo las reglas al pie de la \
                       letra."
                .into(),
            rules_heading: "REGLAS ESTRICTAS DE OPERACIÓN (SIN EXCEPCIÓN)".into(),
            rules: vec![
                "**ENSEÑANZA FOCALIZADA:** Tu conocimiento se limita ESTRICTAMENTE a los \
                 ejercicios de la base de datos. Si un usuario te pide derivar cualquier \
                 otra función o pregunta por otros temas, niégate cortésmente."
                    .into(),
                "**INTERACTIVIDAD:** Debes poder responder preguntas de seguimiento sobre \
                 los pasos o las reglas de derivación utilizadas en un ejercicio."
                    .into(),
                "**REGLA MAESTRA DE FORMATO (LA MÁS IMPORTANTE):**\n\
                 \x20  - Está **ABSOLUTAMENTE PROHIBIDO** escribir texto y expresiones \
                 matemáticas en la misma línea.\n\
                 \x20  - CUALQUIER expresión matemática, por pequeña que sea (una variable, \
                 un número, una función completa), debe estar en su propia línea separada \
                 dentro de un bloque matemático de Markdown.\n\
                 \x20  - El único formato matemático permitido es el de bloque: $$ ... $$. \
                 El formato en línea ($ ... $) está prohibido."
                    .into(),
                "**PASOS NUMERADOS:** Debes enumerar los pasos que sigues en cada proceso: \
                 Paso 1, Paso 2, etc."
                    .into(),
            ],
            reference_heading: "Reglas Básicas de Derivación".into(),
            reference: SPANISH_REFERENCE.into(),
            examples_heading: "DEBES SEGUIR ESTE EJEMPLO DE TRANSFORMACIÓN OBLIGATORIA".into(),
            incorrect_example: FormattingExample {
                label: "EJEMPLO INCORRECTO (PROHIBIDO):".into(),
                text: "La función es $g(x) = 2x^2 - 8x$. Para derivarla, aplicamos la regla \
                       a $2x^2$ y luego..."
                    .into(),
            },
            correct_example: FormattingExample {
                label: "EJEMPLO CORRECTO (OBLIGATORIO):".into(),
                text: "La función que vamos a derivar es:\n\n\n\
                       $$ g(x) = 2x^2 - 8x $$\n\n\n\
                       Para derivarla, primero aplicamos la Regla de la Potencia al término:\n\n\n\
                       $$ 2x^2 $$\n\n\n\
                       Luego, derivamos el segundo término:"
                    .into(),
            },
            examples_closing: "Aplica esta lógica de \"texto en una línea, bloque matemático \
                               en la siguiente\" a CADA parte de tu respuesta."
                .into(),
            catalog: CatalogLabels::spanish(),
            acknowledgment: "Entendido. Mi regla principal es el formato. JAMÁS escribiré \
                             matemáticas en la misma línea que el texto. Cada expresión \
                             matemática, sin importar su tamaño, irá en su propio bloque \
                             $$...$$."
                .into(),
            replies: FixedReplies::spanish(),
        }
    }
}

const ENGLISH_REFERENCE: &str = r"1. **Derivative of a Constant:** if $f(x) = c$, then $f'(x) = 0$.
2. **Derivative of the Identity:** if $f(x) = x$, then $f'(x) = 1$.
3. **Power Rule:** if $f(x) = x^n$, then $f'(x) = n \cdot x^{n-1}$.
4. **Constant Multiple:** if $h(x) = c \cdot f(x)$, then $h'(x) = c \cdot f'(x)$.
5. **Sum/Difference Rule:** if $h(x) = f(x) \pm g(x)$, then $h'(x) = f'(x) \pm g'(x)$.
6. **Product Rule:** if $h(x) = f(x) \cdot g(x)$, then $h'(x) = f'(x) \cdot g(x) + f(x) \cdot g'(x)$.
7. **Quotient Rule:** if $h(x) = f(x) / g(x)$ with $g(x) \neq 0$, then $h'(x) = \frac{f'(x) \cdot g(x) - f(x) \cdot g'(x)}{[g(x)]^2}$.
8. **Chain Rule:** if $h(x) = f(g(x))$, then $h'(x) = f'(g(x)) \cdot g'(x)$.

Derivatives of common functions:

* **Exponential (base $e$):** $\frac{d}{dx} e^x = e^x$.
* **Natural logarithm:** $\frac{d}{dx} \ln(x) = 1/x$.
* **Sine:** $\frac{d}{dx} \sin(x) = \cos(x)$.
* **Cosine:** $\frac{d}{dx} \cos(x) = -\sin(x)$.
* **Tangent:** $\frac{d}{dx} \tan(x) = \sec^2(x)$.";

const SPANISH_REFERENCE: &str = r"1. **Derivada de una Constante:** si $f(x) = c$, entonces $f'(x) = 0$.
2. **Derivada de la Identidad:** si $f(x) = x$, entonces $f'(x) = 1$.
3. **Regla de la Potencia:** si $f(x) = x^n$, entonces $f'(x) = n \cdot x^{n-1}$.
4. **Múltiplo Constante:** si $h(x) = c \cdot f(x)$, entonces $h'(x) = c \cdot f'(x)$.
5. **Regla de la Suma/Resta:** si $h(x) = f(x) \pm g(x)$, entonces $h'(x) = f'(x) \pm g'(x)$.
6. **Regla del Producto:** si $h(x) = f(x) \cdot g(x)$, entonces $h'(x) = f'(x) \cdot g(x) + f(x) \cdot g'(x)$.
7. **Regla del Cociente:** si $h(x) = f(x) / g(x)$ con $g(x) \neq 0$, entonces $h'(x) = \frac{f'(x) \cdot g(x) - f(x) \cdot g'(x)}{[g(x)]^2}$.
8. **Regla de la Cadena:** si $h(x) = f(g(x))$, entonces $h'(x) = f'(g(x)) \cdot g'(x)$.

Derivadas de funciones comunes:

* **Exponencial (base $e$):** $\frac{d}{dx} e^x = e^x$.
* **Logaritmo natural:** $\frac{d}{dx} \ln(x) = 1/x$.
* **Seno:** $\frac{d}{dx} \sin(x) = \cos(x)$.
* **Coseno:** $\frac{d}{dx} \cos(x) = -\sin(x)$.
* **Tangente:** $\frac{d}{dx} \tan(x) = \sec^2(x)$.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_spanish() {
        assert_eq!(PolicyDocument::default(), PolicyDocument::spanish());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let doc: PolicyDocument =
            serde_json::from_str(r#"{"acknowledgment": "Ok.", "replies": {"greeting": "Hey"}}"#)
                .unwrap();
        assert_eq!(doc.acknowledgment, "Ok.");
        assert_eq!(doc.replies.greeting, "Hey");
        assert_eq!(
            doc.replies.safety_blocked,
            FixedReplies::spanish().safety_blocked
        );
        assert_eq!(doc.rules, PolicyDocument::spanish().rules);
    }

    #[test]
    fn from_file_round_trips_the_english_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let json = serde_json::to_string_pretty(&PolicyDocument::english()).unwrap();
        std::fs::write(&path, json).unwrap();

        let loaded = PolicyDocument::from_file(&path).unwrap();
        assert_eq!(loaded, PolicyDocument::english());
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = PolicyDocument::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.contains("failed to read policy file"));
    }

    #[test]
    fn references_cover_the_chain_rule() {
        assert!(ENGLISH_REFERENCE.contains("Chain Rule"));
        assert!(SPANISH_REFERENCE.contains("Regla de la Cadena"));
    }
}
