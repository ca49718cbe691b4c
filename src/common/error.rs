// src/common/error.rs

use thiserror::Error;

// Nosso tipo de erro central, com `thiserror` para melhor ergonomia.
// Toda falha que atravessa a fronteira de um componente vira uma
// variante tipada daqui; nada de strings soltas ou panics.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Erro de validação")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Registro não encontrado")]
    NotFound,

    #[error("Permissão negada")]
    PermissionDenied,

    // Transição de estado recusada pelas tabelas de workflow.
    // Repetir o mesmo comando falha identicamente.
    #[error("Transição de estado não permitida: {0}")]
    PolicyViolation(String),

    // Violação de unicidade ou colisão de edição concorrente.
    #[error("Conflito de dados: {0}")]
    Conflict(String),

    #[error("Falha de rede ao contatar o armazenamento remoto")]
    Network,

    #[error("Operação excedeu o tempo limite")]
    TimedOut,

    // Variante genérica para qualquer outro erro inesperado.
    // `anyhow::Error` é ótimo para capturar o contexto do erro.
    #[error("Erro interno")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    // Erros transitórios podem ser resolvidos reemitindo o mesmo comando.
    // Violações de política e permissão, não: a UI não deve oferecer
    // "tentar novamente" para algo que sempre falhará igual.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Network | CoreError::TimedOut)
    }
}

// Classificação de erros do sqlx na fronteira do pipeline: unicidade
// vira Conflict, linha ausente vira NotFound, falha de transporte vira
// Network. O resto é inesperado.
impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => CoreError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let constraint = db_err
                    .constraint()
                    .unwrap_or("restrição de unicidade")
                    .to_string();
                CoreError::Conflict(constraint)
            }
            sqlx::Error::PoolTimedOut => CoreError::TimedOut,
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                CoreError::Network
            }
            _ => CoreError::Internal(anyhow::anyhow!(err)),
        }
    }
}

impl From<bcrypt::BcryptError> for CoreError {
    fn from(err: bcrypt::BcryptError) -> Self {
        CoreError::Internal(anyhow::anyhow!("Erro de Bcrypt: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for CoreError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            // Token malformado, assinatura errada ou expirado: a sessão
            // não é mais válida, não é um defeito interno.
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::ExpiredSignature
            | ErrorKind::ImmatureSignature => CoreError::InvalidCredentials,
            _ => CoreError::Internal(anyhow::anyhow!("Erro de JWT: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erros_transitorios_sao_retryable() {
        assert!(CoreError::Network.is_retryable());
        assert!(CoreError::TimedOut.is_retryable());
    }

    #[test]
    fn violacoes_de_politica_nao_sao_retryable() {
        assert!(!CoreError::PolicyViolation("x".into()).is_retryable());
        assert!(!CoreError::PermissionDenied.is_retryable());
        assert!(!CoreError::Conflict("username".into()).is_retryable());
    }
}
