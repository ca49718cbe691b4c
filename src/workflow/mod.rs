//! Tabelas de transição puras para os ciclos de vida de Checklist,
//! Orçamento e Token de Convite. Nenhum efeito colateral aqui: só
//! entra estado atual + pedido + papel do principal, e só sai o próximo
//! estado ou um erro tipado. Este módulo é o ÚNICO lugar autorizado a
//! construir um valor novo de status a partir de uma transição.

pub mod budget;
pub mod checklist;
pub mod invite;
